// src/arena.rs
//
// Fixed-pool, first-fit arena allocator.
//
// The pool is one contiguous block of bytes carved into sections. Every
// section starts with an inline header:
//
//   [ size: u64 little-endian | in_use: u8 | data (size bytes) ]
//
// Allocation walks sections from the front and takes the first free one
// that can hold the request after aligning its data start. Freeing only
// flips the flag. Merging neighbours is a separate `coalesce` pass so
// that `deallocate` stays O(1) on the audio thread.
//
// The pool is allocated once in `new`. Nothing afterwards touches the
// system allocator.

use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::error::{ArenaError, ArenaResult};

const SIZE_FIELD: usize = size_of::<u64>();
const HEADER_SIZE: usize = SIZE_FIELD + 1;

const FREE: u8 = 0;
const IN_USE: u8 = 1;

/// Opaque handle returned by `allocate`, needed to free the section again.
///
/// This is the byte offset of the section header within the pool.
pub type DeallocateToken = usize;

/// A live allocation inside an arena.
///
/// Holds no borrow of the arena. The data is reached through
/// `ArenaAllocator::slice` / `slice_mut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaAllocation {
    /// Byte offset of the first element.
    pub offset: usize,
    /// Number of `T` elements.
    pub len: usize,
    /// Token for `deallocate`.
    pub token: DeallocateToken,
}

/// Arena of `T` values backed by a fixed byte pool.
pub struct ArenaAllocator<T: Pod> {
    // u64 words so the pool base is 8-byte aligned
    pool: Vec<u64>,
    _marker: PhantomData<T>,
}

impl<T: Pod> ArenaAllocator<T> {
    /// Create an arena of (at least) `size_bytes` bytes, as one free section.
    pub fn new(size_bytes: usize) -> Self {
        assert!(size_of::<T>() > 0, "arena element type must not be zero-sized");
        assert!(align_of::<T>() <= align_of::<u64>(), "arena element alignment above 8");

        let words = size_bytes.max(HEADER_SIZE + 1).div_ceil(SIZE_FIELD);
        let mut arena = Self {
            pool: vec![0; words],
            _marker: PhantomData,
        };

        let total = arena.capacity_bytes();
        arena.write_header(0, total - HEADER_SIZE, FREE);
        arena
    }

    /// Total pool size in bytes, headers included.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.pool.len() * SIZE_FIELD
    }

    /// Allocate room for `count` elements.
    ///
    /// First fit. The chosen section is split when what is left over can
    /// hold a header plus at least one byte. Otherwise the slack stays in
    /// the allocated section.
    pub fn allocate(&mut self, count: usize) -> ArenaResult<ArenaAllocation> {
        // Saturates so an absurd count fails the fit check below
        let requested = count.saturating_mul(size_of::<T>());
        let total = self.capacity_bytes();
        let mut largest_free = 0;
        let mut header = 0;

        while header < total {
            let (size, flag) = self.read_header(header);

            if flag == FREE {
                largest_free = largest_free.max(size);

                let data_start = align_up(header + HEADER_SIZE, align_of::<T>());
                let used = (data_start - (header + HEADER_SIZE)).saturating_add(requested);

                if used <= size {
                    let remainder = size - used;

                    if remainder > HEADER_SIZE {
                        self.write_header(header, used, IN_USE);
                        self.write_header(header + HEADER_SIZE + used, remainder - HEADER_SIZE, FREE);
                    } else {
                        self.write_header(header, size, IN_USE);
                    }

                    return Ok(ArenaAllocation {
                        offset: data_start,
                        len: count,
                        token: header,
                    });
                }
            }

            header += HEADER_SIZE + size;
        }

        Err(ArenaError::Exhausted {
            requested,
            largest_free,
        })
    }

    /// Release a section. Does not merge it with its neighbours.
    pub fn deallocate(&mut self, token: DeallocateToken) -> ArenaResult<()> {
        if token + HEADER_SIZE > self.capacity_bytes() {
            return Err(ArenaError::InvalidToken(token));
        }

        let (_, flag) = self.read_header(token);
        if flag != IN_USE {
            return Err(ArenaError::InvalidToken(token));
        }

        self.bytes_mut()[token + SIZE_FIELD] = FREE;
        Ok(())
    }

    /// Merge every run of adjacent free sections into one section.
    ///
    /// Walks the whole pool.
    pub fn coalesce(&mut self) {
        let total = self.capacity_bytes();
        let mut header = 0;

        while header < total {
            let (mut size, flag) = self.read_header(header);

            if flag == FREE {
                let mut next = header + HEADER_SIZE + size;
                while next < total {
                    let (next_size, next_flag) = self.read_header(next);
                    if next_flag != FREE {
                        break;
                    }
                    size += HEADER_SIZE + next_size;
                    next = header + HEADER_SIZE + size;
                }
                self.write_header(header, size, FREE);
            }

            header += HEADER_SIZE + size;
        }
    }

    /// Sum of the data sizes of all free sections.
    pub fn free_bytes(&self) -> usize {
        self.sections()
            .filter(|&(_, _, flag)| flag == FREE)
            .map(|(_, size, _)| size)
            .sum()
    }

    /// Number of sections currently in the pool, free or not.
    pub fn section_count(&self) -> usize {
        self.sections().count()
    }

    #[inline]
    pub fn slice(&self, allocation: &ArenaAllocation) -> &[T] {
        let end = allocation.offset + allocation.len * size_of::<T>();
        bytemuck::cast_slice(&self.bytes()[allocation.offset..end])
    }

    #[inline]
    pub fn slice_mut(&mut self, allocation: &ArenaAllocation) -> &mut [T] {
        let end = allocation.offset + allocation.len * size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.bytes_mut()[allocation.offset..end])
    }

    /// Copy the first `count` elements of `from` into `to`.
    pub fn copy_elements(&mut self, from: &ArenaAllocation, to: &ArenaAllocation, count: usize) {
        let count = count.min(from.len).min(to.len);
        let bytes = count * size_of::<T>();
        self.bytes_mut()
            .copy_within(from.offset..from.offset + bytes, to.offset);
    }

    // -------------------------------
    // MARK: Header access
    // -------------------------------

    #[inline]
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pool)
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.pool)
    }

    #[inline]
    fn read_header(&self, header: usize) -> (usize, u8) {
        let bytes = self.bytes();
        let mut size = [0u8; SIZE_FIELD];
        size.copy_from_slice(&bytes[header..header + SIZE_FIELD]);
        (u64::from_le_bytes(size) as usize, bytes[header + SIZE_FIELD])
    }

    #[inline]
    fn write_header(&mut self, header: usize, size: usize, flag: u8) {
        let bytes = self.bytes_mut();
        bytes[header..header + SIZE_FIELD].copy_from_slice(&(size as u64).to_le_bytes());
        bytes[header + SIZE_FIELD] = flag;
    }

    /// (header offset, data size, flag) for every section, front to back.
    fn sections(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        let total = self.capacity_bytes();
        let mut header = 0;
        std::iter::from_fn(move || {
            if header >= total {
                return None;
            }
            let (size, flag) = self.read_header(header);
            let item = (header, size, flag);
            header += HEADER_SIZE + size;
            Some(item)
        })
    }
}

impl<T: Pod> std::fmt::Debug for ArenaAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("capacity_bytes", &self.capacity_bytes())
            .field("free_bytes", &self.free_bytes())
            .field("sections", &self.section_count())
            .finish()
    }
}

#[inline]
fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

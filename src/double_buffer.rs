// src/double_buffer.rs
//
// Two-slot "latest value wins" cell for small Copy values.
//
// One slot is the read target, the other is where the writer puts the
// next value. A single atomic try-lock guards the read-target index and
// the stale flag. Neither side ever waits on it:
// - the audio thread reads the current slot even when the lock is taken
// - the control thread parks the value and retries on a helper thread

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// First retry delay after a failed `set`.
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Upper bound for the retry delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Create a cell holding `initial`, split into its two ends.
pub fn double_buffered<T>(initial: T) -> (CellWriter<T>, CellReader<T>)
where
    T: Copy + Send + 'static,
{
    let shared = Arc::new(Shared {
        lock: AtomicBool::new(false),
        read_target: AtomicUsize::new(0),
        stale: AtomicBool::new(false),
        slots: [UnsafeCell::new(initial), UnsafeCell::new(initial)],
    });

    let writer = CellWriter {
        shared: Arc::clone(&shared),
        pending: Arc::new(Mutex::new(None)),
    };

    (writer, CellReader { shared })
}

struct Shared<T> {
    lock: AtomicBool,
    read_target: AtomicUsize,
    stale: AtomicBool,
    slots: [UnsafeCell<T>; 2],
}

// SAFETY: the writer only writes the slot that is not the read target,
// and only while holding `lock`. The read target only changes while the
// reader holds `lock`. Both ends take `&mut self`, so there is at most
// one writer and one reader.
unsafe impl<T: Send> Sync for Shared<T> {}

struct LockGuard<'a> {
    lock: &'a AtomicBool,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl<T: Copy> Shared<T> {
    #[inline]
    fn try_lock(&self) -> Option<LockGuard<'_>> {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard { lock: &self.lock })
    }

    /// Write into the back slot if the lock is free.
    fn try_publish(&self, value: T) -> bool {
        let Some(_guard) = self.try_lock() else {
            return false;
        };

        let write = 1 - self.read_target.load(Ordering::Acquire);
        // SAFETY: the lock is held and `write` is not the read target,
        // so the reader is not looking at this slot.
        unsafe {
            *self.slots[write].get() = value;
        }
        self.stale.store(true, Ordering::Release);
        true
    }
}

//
// ===============================
// MARK: Writer (control thread)
// ===============================
//

/// Control-thread end of the cell.
pub struct CellWriter<T> {
    shared: Arc<Shared<T>>,

    /// Value waiting for a retry. `Some` means a retry thread is running.
    pending: Arc<Mutex<Option<T>>>,
}

impl<T> CellWriter<T>
where
    T: Copy + Send + 'static,
{
    /// Publish a new value.
    ///
    /// Never blocks on the audio thread. If the reader holds the lock
    /// the value is parked and retried with exponential backoff. A
    /// later `set` while a retry is pending replaces the parked value.
    pub fn set(&mut self, value: T) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

        if pending.is_some() {
            *pending = Some(value);
            return;
        }

        if self.shared.try_publish(value) {
            return;
        }

        *pending = Some(value);
        drop(pending);
        self.spawn_retry();
    }

    /// True while a value is parked waiting for the lock.
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn spawn_retry(&self) {
        let shared = Arc::clone(&self.shared);
        let pending = Arc::clone(&self.pending);

        let spawned = thread::Builder::new()
            .name("double-buffer-retry".to_string())
            .spawn(move || {
                let mut delay = INITIAL_RETRY_DELAY;
                loop {
                    thread::sleep(delay);

                    let mut slot = pending.lock().unwrap_or_else(PoisonError::into_inner);
                    match *slot {
                        Some(value) if shared.try_publish(value) => {
                            *slot = None;
                            return;
                        }
                        Some(_) => {}
                        None => return,
                    }
                    drop(slot);

                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            });

        if let Err(e) = spawned {
            log::error!("Could not start retry thread, value dropped: {}", e);
            *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}

//
// ===============================
// MARK: Reader (audio thread)
// ===============================
//

/// Audio-thread end of the cell.
pub struct CellReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> CellReader<T> {
    /// Latest published value.
    ///
    /// Lock-free and wait-free. When the writer holds the lock this
    /// returns the previous value, which is always complete.
    #[inline]
    pub fn rt_get(&mut self) -> T {
        let shared = &*self.shared;

        if let Some(_guard) = shared.try_lock() {
            if shared.stale.load(Ordering::Acquire) {
                let read = shared.read_target.load(Ordering::Relaxed);
                shared.read_target.store(1 - read, Ordering::Release);
                shared.stale.store(false, Ordering::Release);
            }
        }

        let read = shared.read_target.load(Ordering::Acquire);
        // SAFETY: only this reader moves the read target, and the writer
        // never writes the read-target slot.
        unsafe { *shared.slots[read].get() }
    }
}

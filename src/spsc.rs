// src/spsc.rs
//
// Bounded single-producer/single-consumer queue.
//
// Thin wrapper around `rtrb`. The writer and reader halves are separate
// non-Clone types, so each end can only ever be owned by one thread.

use rtrb::{Consumer, Producer, PushError, RingBuffer};

/// Create a queue holding at most `capacity` items.
pub fn queue<T>(capacity: usize) -> (QueueWriter<T>, QueueReader<T>) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (QueueWriter { producer }, QueueReader { consumer })
}

/// Writing end. Owned by exactly one thread.
pub struct QueueWriter<T> {
    producer: Producer<T>,
}

/// Reading end. Owned by exactly one thread.
pub struct QueueReader<T> {
    consumer: Consumer<T>,
}

impl<T> QueueWriter<T> {
    /// Push an item without blocking.
    ///
    /// When the queue is full nothing changes and the item is handed
    /// back, so the caller decides whether to keep, log or count it.
    #[inline]
    pub fn add(&mut self, item: T) -> Result<(), T> {
        self.producer.push(item).map_err(|PushError::Full(item)| item)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }

    /// Number of items that can be added right now.
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }

    /// True once the reader has been dropped.
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

impl<T> QueueReader<T> {
    /// Pop the oldest item, or `None` if the queue is empty. Never blocks.
    #[inline]
    pub fn read(&mut self) -> Option<T> {
        self.consumer.pop().ok()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Number of items waiting to be read.
    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.slots()
    }
}

impl<T> std::fmt::Debug for QueueWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWriter")
            .field("free_slots", &self.free_slots())
            .finish()
    }
}

impl<T> std::fmt::Debug for QueueReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReader").field("len", &self.len()).finish()
    }
}

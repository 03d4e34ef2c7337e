// src/handoff.rs
//
// Two-queue ownership handoff between the control thread and the audio
// thread.
//
// The control thread sends whole objects (plans, sequence maps, jump
// events) down one SPSC queue. The audio thread adopts them at the top
// of a block and sends whatever they replaced back up a second queue.
// The control thread drops returned objects on its own schedule, so the
// audio thread never frees memory.

use std::collections::VecDeque;

use crate::spsc::{self, QueueReader, QueueWriter};

/// Create a linked sender/receiver pair. Both queues hold `capacity` items.
pub fn handoff<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (outgoing, incoming) = spsc::queue(capacity);
    let (retired, returned) = spsc::queue(capacity);

    (
        HandoffSender {
            outgoing,
            returned,
            backlog: VecDeque::new(),
        },
        HandoffReceiver { incoming, retired },
    )
}

//
// ===============================
// MARK: Control-thread end
// ===============================
//

pub struct HandoffSender<T> {
    outgoing: QueueWriter<T>,
    returned: QueueReader<T>,
    /// Items that found the queue full, in send order.
    backlog: VecDeque<T>,
}

impl<T> HandoffSender<T> {
    /// Send one item. A full queue hands the item back.
    pub fn send(&mut self, item: T) -> Result<(), T> {
        if !self.backlog.is_empty() {
            return Err(item);
        }
        self.outgoing.add(item)
    }

    /// Send one item, parking it (and everything after it) when the
    /// queue is full. Parked items keep their order.
    ///
    /// Returns `true` if the item went out immediately.
    pub fn send_or_queue(&mut self, item: T) -> bool {
        self.flush_backlog();

        if !self.backlog.is_empty() {
            self.backlog.push_back(item);
            return false;
        }

        match self.outgoing.add(item) {
            Ok(()) => true,
            Err(item) => {
                self.backlog.push_back(item);
                false
            }
        }
    }

    /// Move parked items onto the queue, oldest first. Returns how many went out.
    pub fn flush_backlog(&mut self) -> usize {
        let mut sent = 0;
        while let Some(item) = self.backlog.pop_front() {
            if let Err(item) = self.outgoing.add(item) {
                self.backlog.push_front(item);
                break;
            }
            sent += 1;
        }
        sent
    }

    #[inline]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Take back the next object the audio thread has finished with.
    #[inline]
    pub fn next_returned(&mut self) -> Option<T> {
        self.returned.read()
    }
}

//
// ===============================
// MARK: Audio-thread end
// ===============================
//

/// What happened during one `adopt` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Adoption {
    /// Items taken off the queue and made active.
    pub adopted: usize,
    /// True if items were left waiting because the return queue was full.
    pub deferred: bool,
}

pub struct HandoffReceiver<T> {
    incoming: QueueReader<T>,
    retired: QueueWriter<T>,
}

impl<T> HandoffReceiver<T> {
    /// Make the newest waiting item active, returning every item it
    /// replaces.
    ///
    /// Stops early, leaving items queued for a later block, whenever the
    /// return queue has no more than `reserve` free slots. Nothing is
    /// ever dropped here.
    pub fn adopt(&mut self, active: &mut Option<T>, reserve: usize) -> Adoption {
        let mut outcome = Adoption::default();

        loop {
            let needed = if active.is_some() { reserve + 1 } else { reserve };
            if self.retired.free_slots() < needed {
                outcome.deferred = !self.incoming.is_empty();
                break;
            }

            let Some(item) = self.incoming.read() else {
                break;
            };

            if let Some(old) = active.replace(item) {
                self.retire(old);
            }
            outcome.adopted += 1;
        }

        outcome
    }

    /// Return an object to the control thread.
    ///
    /// The caller must have checked for a free slot, which `adopt` does.
    #[inline]
    pub fn retire(&mut self, item: T) {
        if let Err(item) = self.retired.add(item) {
            // Only reachable if the slot reservation above was wrong.
            // Leaking keeps the deallocation off the audio thread.
            debug_assert!(false, "retirement queue overflow");
            std::mem::forget(item);
        }
    }
}

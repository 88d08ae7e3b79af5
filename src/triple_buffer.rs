/*!
Lock-free triple buffering between one producer and one consumer.

Three slots rotate between three owners: the producer's work slot, the
consumer's feed slot, and a spare slot nobody touches. Ownership moves only
through a single atomic exchange on the spare index, so neither side ever
waits for the other. The consumer may skip frames; it never sees a slot the
producer is writing.

Ordering:
- `commit` publishes the slot's ready flag and contents with a release
  store followed by an acquire-release exchange. The acquire half makes sure
  the consumer has finished reading the slot the producer gets back.
- `fetch` releases its old slot through the same exchange and reads the
  ready flag of the slot it receives with acquire ordering, pairing with the
  release in `commit`.

The split into [`Producer`] and [`Consumer`] handles keeps each side on its
own slot: the work slot is only reachable through `&mut Producer`, the feed
slot only through `&Consumer`.
*/

use std::{
    cell::UnsafeCell,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

struct Shared<T> {
    slots: [UnsafeCell<T>; 3],
    ready: [AtomicBool; 3],
    spare: AtomicUsize,
}

// SAFETY: a slot is mutated only by the producer while it holds the slot's
// index exclusively; indices change hands through the atomic `spare`
// exchange. Slots may be read from both threads at once (the consumer's feed
// slot and the producer's copy source), hence `T: Sync`.
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

/// Creates the three slots, each a clone of `initial`, and returns the two
/// ends of the exchange.
pub fn triple_buffer<T: Clone>(initial: T) -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial),
        ],
        ready: [
            AtomicBool::new(false),
            AtomicBool::new(false),
            AtomicBool::new(false),
        ],
        spare: AtomicUsize::new(1),
    });

    (
        Producer {
            shared: shared.clone(),
            work: 0,
        },
        Consumer { shared, feed: 2 },
    )
}

pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    work: usize,
}

impl<T> Producer<T> {
    /// The slot the producer is currently filling.
    pub fn work_buffer(&mut self) -> &mut T {
        // SAFETY: `work` is owned by this producer until the next `commit`,
        // and the returned borrow ends before `commit` can run.
        unsafe { &mut *self.shared.slots[self.work].get() }
    }

    /// Hands the work slot over as the newest complete frame and takes the
    /// spare slot as the next work slot. With `copy` set the new work slot
    /// starts as a copy of the frame just committed; otherwise it keeps
    /// whatever stale contents it had.
    pub fn commit(&mut self, copy: bool)
    where
        T: Clone,
    {
        let shared = &*self.shared;
        let committed = self.work;

        shared.ready[committed].store(true, Ordering::Release);
        self.work = shared.spare.swap(committed, Ordering::AcqRel);

        if copy {
            // SAFETY: `self.work` is exclusively ours. `committed` is now the
            // spare or the consumer's feed slot; neither side writes to it
            // until the producer owns it again, so a shared read is sound.
            let (source, target) = unsafe {
                (
                    &*shared.slots[committed].get(),
                    &mut *shared.slots[self.work].get(),
                )
            };
            target.clone_from(source);
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("work", &self.work).finish()
    }
}

pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    feed: usize,
}

impl<T> Consumer<T> {
    /// Swaps the feed slot for the spare one. Returns `true` when the slot
    /// received holds a frame committed since the consumer last looked,
    /// `false` when it is a recycled stale slot.
    pub fn fetch(&mut self) -> bool {
        let shared = &*self.shared;

        shared.ready[self.feed].store(false, Ordering::Relaxed);
        self.feed = shared.spare.swap(self.feed, Ordering::AcqRel);
        shared.ready[self.feed].load(Ordering::Acquire)
    }

    /// The slot the consumer currently owns. Valid until the next `fetch`.
    pub fn feed_buffer(&self) -> &T {
        // SAFETY: `feed` is owned by this consumer until the next `fetch`,
        // which needs `&mut self` and so cannot overlap this borrow.
        unsafe { &*self.shared.slots[self.feed].get() }
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("feed", &self.feed).finish()
    }
}

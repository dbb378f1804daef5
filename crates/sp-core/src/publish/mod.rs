//! In-process publish/subscribe primitives.
//!
//! A [`Publisher`] fans every message read from one intake channel out to a
//! dynamic set of subscribers. A [`Broker`] routes messages to one publisher
//! per topic key.
//!
//! # Design Notes
//!
//! - One broadcast thread per publisher serializes delivery, so every
//!   subscriber sees messages in publish order.
//! - Subscriber channels are bounded; a full subscriber blocks the broadcast
//!   thread instead of losing messages.
//! - Subscriber slots form an index-addressed arena. Cancelling empties a
//!   slot in place, later subscribers reuse it, and trailing empty slots are
//!   trimmed.
//! - The slot list is read-locked while broadcasting and write-locked for
//!   subscribe, cancel and shutdown. A sender is dropped exactly once,
//!   whichever path gets to it first.

pub mod broker;

pub use broker::Broker;

use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, Once, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// Default buffer size of subscriber channels and topic intakes.
pub const DEFAULT_CAPACITY: usize = 100;

/// A receiver whose sending side is already gone.
pub(crate) fn closed_channel<M>() -> Receiver<M> {
    let (_, rx) = mpsc::sync_channel(0);
    rx
}

/// One occupied subscriber slot.
struct Slot<M> {
    id: u64,
    sender: SyncSender<M>,
}

/// Sparse, ordered subscriber arena.
struct SlotList<M> {
    slots: Vec<Option<Slot<M>>>,
    next_id: u64,
    closed: bool,
}

impl<M> SlotList<M> {
    fn new() -> Self {
        SlotList {
            slots: Vec::new(),
            next_id: 0,
            closed: false,
        }
    }

    /// Store `sender` in the first free slot, appending if none is free.
    /// Returns the slot position and the subscription id.
    fn insert(&mut self, sender: SyncSender<M>) -> (usize, u64) {
        let id = self.next_id;
        self.next_id += 1;

        let slot = Some(Slot { id, sender });
        match self.slots.iter().position(Option::is_none) {
            Some(pos) => {
                self.slots[pos] = slot;
                (pos, id)
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1, id)
            }
        }
    }

    /// Drop the sender at `pos` if it still belongs to subscription `id`.
    fn remove(&mut self, pos: usize, id: u64) -> bool {
        let owned = matches!(self.slots.get(pos), Some(Some(slot)) if slot.id == id);
        if owned {
            self.slots[pos] = None;
            self.trim();
        }
        owned
    }

    /// Right-trim empty slots.
    fn trim(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }

    /// Drop every remaining sender and refuse new subscribers.
    fn close(&mut self) -> usize {
        let released = self.live();
        self.slots.clear();
        self.closed = true;
        released
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

type SharedSlots<M> = Arc<RwLock<SlotList<M>>>;

fn read_slots<M>(slots: &RwLock<SlotList<M>>) -> RwLockReadGuard<'_, SlotList<M>> {
    slots.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_slots<M>(slots: &RwLock<SlotList<M>>) -> RwLockWriteGuard<'_, SlotList<M>> {
    slots.write().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot handle that ends a subscription.
///
/// Clones share the same state: only the first `cancel` call across all
/// clones has an effect.
#[derive(Clone)]
pub struct Cancel {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    once: Once,
    action: Box<dyn Fn() + Send + Sync>,
}

impl Cancel {
    fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Cancel {
            inner: Arc::new(CancelInner {
                once: Once::new(),
                action: Box::new(action),
            }),
        }
    }

    /// Handle for a subscription that was never registered.
    pub(crate) fn noop() -> Self {
        Self::new(|| {})
    }

    /// End the subscription and close its channel once buffered messages
    /// are drained. Later calls do nothing.
    ///
    /// Waits for an in-flight broadcast to finish, so the receiver must keep
    /// draining (or be dropped) while this runs.
    pub fn cancel(&self) {
        self.inner.once.call_once(|| (self.inner.action)());
    }

    /// Whether `cancel` has already run.
    pub fn is_cancelled(&self) -> bool {
        self.inner.once.is_completed()
    }
}

impl fmt::Debug for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancel")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Fan-out of one intake channel to a dynamic set of subscribers.
pub struct Publisher<M> {
    slots: SharedSlots<M>,
    capacity: usize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Clone + Send + 'static> Publisher<M> {
    /// Start broadcasting messages received from `intake`.
    ///
    /// Subscriber channels are closed once `intake` disconnects and every
    /// message before that has been delivered.
    pub fn new(intake: Receiver<M>) -> Self {
        Self::with_capacity(intake, DEFAULT_CAPACITY)
    }

    /// Like [`Publisher::new`] with `capacity` messages of subscriber buffer.
    pub fn with_capacity(intake: Receiver<M>, capacity: usize) -> Self {
        let slots: SharedSlots<M> = Arc::new(RwLock::new(SlotList::new()));
        let loop_slots = Arc::clone(&slots);

        let worker = match thread::Builder::new()
            .name("sp-publish".to_string())
            .spawn(move || broadcast_loop(intake, loop_slots))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Without a broadcast loop nothing can ever be delivered.
                error!(error = %e, "failed to spawn broadcast thread");
                write_slots(&slots).close();
                None
            }
        };

        Publisher {
            slots,
            capacity: capacity.max(1),
            worker: Mutex::new(worker),
        }
    }

    /// Attach a new subscriber.
    ///
    /// The receiver yields every message broadcast after this call until the
    /// subscription is cancelled or the intake closes. Subscribing to a
    /// closed publisher returns an already-closed receiver.
    pub fn subscribe(&self) -> (Receiver<M>, Cancel) {
        let (tx, rx) = mpsc::sync_channel(self.capacity);

        let (pos, id) = {
            let mut list = write_slots(&self.slots);
            if list.closed {
                return (rx, Cancel::noop());
            }
            list.insert(tx)
        };
        trace!(slot = pos, subscription = id, "subscriber attached");

        let slots: Weak<RwLock<SlotList<M>>> = Arc::downgrade(&self.slots);
        let cancel = Cancel::new(move || {
            if let Some(slots) = slots.upgrade() {
                if write_slots(&slots).remove(pos, id) {
                    trace!(slot = pos, subscription = id, "subscriber cancelled");
                }
            }
        });

        (rx, cancel)
    }
}

impl<M> Publisher<M> {
    /// Number of attached subscribers.
    pub fn subscribers(&self) -> usize {
        read_slots(&self.slots).live()
    }

    /// Whether the intake has closed and all subscribers were released.
    pub fn is_closed(&self) -> bool {
        read_slots(&self.slots).closed
    }

    /// Wait for the broadcast thread to finish.
    ///
    /// Only returns once the intake has disconnected and every subscriber
    /// has accepted the messages published before that.
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("broadcast thread panicked");
            }
        }
    }
}

impl<M> fmt::Debug for Publisher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subscribers", &self.subscribers())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn broadcast_loop<M: Clone>(intake: Receiver<M>, slots: SharedSlots<M>) {
    let mut broadcast: u64 = 0;

    for message in intake.iter() {
        let mut gone = Vec::new();
        {
            let list = read_slots(&slots);
            for (pos, slot) in list.slots.iter().enumerate() {
                if let Some(slot) = slot {
                    // Blocks while this subscriber's buffer is full.
                    if slot.sender.send(message.clone()).is_err() {
                        gone.push((pos, slot.id));
                    }
                }
            }
        }
        broadcast += 1;

        // Receivers dropped without cancelling.
        if !gone.is_empty() {
            let mut list = write_slots(&slots);
            for (pos, id) in gone {
                list.remove(pos, id);
            }
        }
    }

    let released = write_slots(&slots).close();
    debug!(broadcast, released, "intake closed, subscribers released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn publisher() -> (SyncSender<u32>, Publisher<u32>) {
        let (tx, rx) = mpsc::sync_channel(DEFAULT_CAPACITY);
        (tx, Publisher::new(rx))
    }

    fn slot_len<M>(publisher: &Publisher<M>) -> usize {
        read_slots(&publisher.slots).slots.len()
    }

    #[test]
    fn test_publisher_preserves_order() {
        let (tx, publisher) = publisher();
        let (sub, _cancel) = publisher.subscribe();

        const LIMIT: u32 = 1000;
        let producer = thread::spawn(move || {
            for i in 0..LIMIT {
                tx.send(i).unwrap();
            }
        });

        for want in 0..LIMIT {
            assert_eq!(sub.recv().unwrap(), want);
        }
        producer.join().unwrap();
    }

    #[test]
    fn test_two_subscribers_receive_each_message_once() {
        let (tx, publisher) = publisher();
        let (a, _ca) = publisher.subscribe();
        let (b, _cb) = publisher.subscribe();

        tx.send(7).unwrap();
        tx.send(8).unwrap();
        drop(tx);

        assert_eq!(a.iter().collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![7, 8]);
    }

    #[test]
    fn test_cancel_closes_channel_and_is_idempotent() {
        let (tx, publisher) = publisher();
        let (sub, cancel) = publisher.subscribe();
        let (other, _other_cancel) = publisher.subscribe();

        cancel.cancel();
        assert!(cancel.is_cancelled());
        cancel.cancel();
        cancel.clone().cancel();

        tx.send(1).unwrap();
        assert_eq!(other.recv().unwrap(), 1);
        assert!(sub.recv().is_err());
        assert_eq!(publisher.subscribers(), 1);
    }

    #[test]
    fn test_cancel_keeps_buffered_messages() {
        let (tx, publisher) = publisher();
        let (sub, cancel) = publisher.subscribe();
        let (witness, _witness_cancel) = publisher.subscribe();

        tx.send(5).unwrap();
        // Once the witness has it, the broadcast to `sub` happened too.
        assert_eq!(witness.recv().unwrap(), 5);
        cancel.cancel();

        assert_eq!(sub.iter().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_slot_reuse_and_right_trim() {
        let (_tx, publisher) = publisher();
        let (_a, cancel_a) = publisher.subscribe();
        let (_b, cancel_b) = publisher.subscribe();
        let (_c, cancel_c) = publisher.subscribe();
        assert_eq!(slot_len(&publisher), 3);

        cancel_b.cancel();
        assert_eq!(slot_len(&publisher), 3);
        assert_eq!(publisher.subscribers(), 2);

        let (_d, cancel_d) = publisher.subscribe();
        assert_eq!(slot_len(&publisher), 3);

        cancel_c.cancel();
        assert_eq!(slot_len(&publisher), 2);

        cancel_d.cancel();
        assert_eq!(slot_len(&publisher), 1);
        cancel_a.cancel();
        assert_eq!(slot_len(&publisher), 0);
    }

    #[test]
    fn test_stale_cancel_does_not_close_reused_slot() {
        let (tx, publisher) = publisher();
        let (_a, cancel_a) = publisher.subscribe();
        let (_keep, _cancel_keep) = publisher.subscribe();
        cancel_a.cancel();

        // Reuses slot 0.
        let (b, _cancel_b) = publisher.subscribe();
        let stale = cancel_a.clone();
        stale.cancel();

        tx.send(9).unwrap();
        assert_eq!(b.recv().unwrap(), 9);
        assert_eq!(publisher.subscribers(), 2);
    }

    #[test]
    fn test_intake_close_releases_all_subscribers() {
        let (tx, publisher) = publisher();
        let subs: Vec<_> = (0..16).map(|_| publisher.subscribe()).collect();

        let barrier = Arc::new(Barrier::new(9));
        let cancellers: Vec<_> = subs
            .iter()
            .step_by(2)
            .map(|(_, cancel)| {
                let cancel = cancel.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cancel.cancel();
                })
            })
            .collect();

        barrier.wait();
        drop(tx);
        publisher.join();

        for handle in cancellers {
            handle.join().unwrap();
        }
        for (rx, cancel) in &subs {
            assert!(rx.recv().is_err());
            cancel.cancel();
        }
        assert!(publisher.is_closed());
        assert_eq!(publisher.subscribers(), 0);
    }

    #[test]
    fn test_subscribe_after_close_returns_closed_channel() {
        let (tx, publisher) = publisher();
        drop(tx);
        publisher.join();

        let (rx, cancel) = publisher.subscribe();
        assert!(rx.recv().is_err());
        cancel.cancel();
    }

    #[test]
    fn test_publish_without_subscribers_is_absorbed() {
        let (tx, publisher) = publisher();
        for i in 0..(DEFAULT_CAPACITY as u32 * 3) {
            tx.send(i).unwrap();
        }
        drop(tx);
        publisher.join();
        assert!(publisher.is_closed());
    }

    #[test]
    fn test_dropped_receiver_is_reaped() {
        let (tx, publisher) = publisher();
        let (dropped, _cancel) = publisher.subscribe();
        let (live, _live_cancel) = publisher.subscribe();
        drop(dropped);

        tx.send(1).unwrap();
        assert_eq!(live.recv().unwrap(), 1);
        tx.send(2).unwrap();
        assert_eq!(live.recv().unwrap(), 2);

        assert_eq!(publisher.subscribers(), 1);
    }

    #[test]
    fn test_full_subscriber_applies_backpressure() {
        let (tx, rx) = mpsc::sync_channel(1);
        let publisher = Publisher::with_capacity(rx, 1);
        let (slow, _cancel) = publisher.subscribe();

        let producer = thread::spawn(move || {
            for i in 0..50u32 {
                tx.send(i).unwrap();
            }
        });

        // Nothing is dropped even though the subscriber holds one message.
        let received: Vec<u32> = slow.iter().take(50).collect();
        assert_eq!(received, (0..50).collect::<Vec<_>>());
        producer.join().unwrap();
    }
}

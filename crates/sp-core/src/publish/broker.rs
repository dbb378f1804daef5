//! Topic routing on top of [`Publisher`].
//!
//! Each topic owns a bounded intake channel and one publisher fed by it.
//! Topics are created lazily by the first publish or subscribe.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::{closed_channel, Cancel, Publisher, DEFAULT_CAPACITY};

struct Topic<M> {
    intake: SyncSender<M>,
    publisher: Arc<Publisher<M>>,
}

struct TopicMap<T, M> {
    open: HashMap<T, Topic<M>>,
    closed: bool,
}

/// Topic-keyed publish/subscribe broker.
pub struct Broker<T, M> {
    topics: Mutex<TopicMap<T, M>>,
    capacity: usize,
}

impl<T, M> Broker<T, M>
where
    T: Eq + Hash + Clone + fmt::Debug,
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Broker whose topic intakes and subscriber channels buffer `capacity`
    /// messages each.
    pub fn with_capacity(capacity: usize) -> Self {
        Broker {
            topics: Mutex::new(TopicMap {
                open: HashMap::new(),
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicMap<T, M>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_topic<'a>(&self, map: &'a mut TopicMap<T, M>, topic: &T) -> &'a Topic<M> {
        map.open.entry(topic.clone()).or_insert_with(|| {
            let (intake, rx) = mpsc::sync_channel(self.capacity);
            debug!(topic = ?topic, "topic created");
            Topic {
                intake,
                publisher: Arc::new(Publisher::with_capacity(rx, self.capacity)),
            }
        })
    }

    /// Deliver `message` to every current subscriber of `topic`.
    ///
    /// Blocks while the topic intake is full. Messages for a topic without
    /// subscribers, or sent after [`Broker::close`], are absorbed.
    pub fn publish(&self, topic: &T, message: M) {
        let intake = {
            let mut map = self.lock();
            if map.closed {
                trace!(topic = ?topic, "broker closed, message absorbed");
                return;
            }
            self.open_topic(&mut map, topic).intake.clone()
        };

        if intake.send(message).is_err() {
            trace!(topic = ?topic, "broadcast loop gone, message absorbed");
        }
    }

    /// Attach a subscriber to `topic`, creating the topic if needed.
    ///
    /// After [`Broker::close`] the returned receiver is already closed.
    pub fn subscribe(&self, topic: &T) -> (Receiver<M>, Cancel) {
        let publisher = {
            let mut map = self.lock();
            if map.closed {
                return (closed_channel(), Cancel::noop());
            }
            Arc::clone(&self.open_topic(&mut map, topic).publisher)
        };
        publisher.subscribe()
    }

    /// Close the intake of `topic` and wait until its subscribers have
    /// received everything published so far and are closed.
    ///
    /// Returns false when the topic was not open.
    pub fn close_topic(&self, topic: &T) -> bool {
        let removed = self.lock().open.remove(topic);
        match removed {
            Some(entry) => {
                shutdown(entry);
                debug!(topic = ?topic, "topic closed");
                true
            }
            None => false,
        }
    }

    /// Close every topic and make the broker terminal.
    ///
    /// Later publishes are absorbed and later subscriptions are closed
    /// immediately. Calling it again has no effect.
    pub fn close(&self) {
        let drained: Vec<(T, Topic<M>)> = {
            let mut map = self.lock();
            map.closed = true;
            map.open.drain().collect()
        };

        let count = drained.len();
        for (_, entry) in drained {
            shutdown(entry);
        }
        if count > 0 {
            debug!(topics = count, "broker closed");
        }
    }

    /// Topics currently open.
    pub fn topics(&self) -> Vec<T> {
        self.lock().open.keys().cloned().collect()
    }

    /// Subscribers currently attached to `topic`.
    pub fn subscribers(&self, topic: &T) -> usize {
        self.lock()
            .open
            .get(topic)
            .map(|entry| entry.publisher.subscribers())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn shutdown<M>(topic: Topic<M>) {
    let Topic { intake, publisher } = topic;
    drop(intake);
    publisher.join();
}

impl<T, M> Default for Broker<T, M>
where
    T: Eq + Hash + Clone + fmt::Debug,
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> fmt::Debug for Broker<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Broker")
            .field("topics", &map.open.len())
            .field("closed", &map.closed)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Color {
        Red,
        Blue,
    }

    #[test]
    fn test_topics_are_isolated() {
        let broker: Broker<Color, u32> = Broker::new();
        let (red, _cr) = broker.subscribe(&Color::Red);
        let (blue, _cb) = broker.subscribe(&Color::Blue);

        broker.publish(&Color::Red, 1);
        broker.publish(&Color::Blue, 2);
        broker.publish(&Color::Red, 3);
        broker.close();

        assert_eq!(red.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(blue.iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_same_topic_two_subscribers() {
        let broker: Broker<Color, &'static str> = Broker::new();
        let (a, _ca) = broker.subscribe(&Color::Red);
        let (b, _cb) = broker.subscribe(&Color::Red);
        assert_eq!(broker.subscribers(&Color::Red), 2);

        broker.publish(&Color::Red, "m1");
        broker.publish(&Color::Red, "m2");
        assert!(broker.close_topic(&Color::Red));

        assert_eq!(a.iter().collect::<Vec<_>>(), vec!["m1", "m2"]);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_publish_creates_topic_lazily() {
        let broker: Broker<Color, u32> = Broker::new();
        assert!(broker.topics().is_empty());
        broker.publish(&Color::Blue, 1);
        assert_eq!(broker.topics(), vec![Color::Blue]);
        assert_eq!(broker.subscribers(&Color::Blue), 0);
    }

    #[test]
    fn test_cancelled_subscriber_is_skipped() {
        let broker: Broker<Color, u32> = Broker::new();
        let (gone, cancel) = broker.subscribe(&Color::Red);
        let (kept, _kept_cancel) = broker.subscribe(&Color::Red);
        cancel.cancel();

        for i in 0..10 {
            broker.publish(&Color::Red, i);
        }
        cancel.cancel();
        broker.close();

        assert!(gone.recv().is_err());
        assert_eq!(kept.iter().count(), 10);
    }

    #[test]
    fn test_close_is_terminal() {
        let broker: Broker<Color, u32> = Broker::new();
        broker.close();
        broker.close();
        assert!(broker.is_closed());

        broker.publish(&Color::Red, 1);
        let (rx, cancel) = broker.subscribe(&Color::Red);
        assert!(rx.recv().is_err());
        cancel.cancel();
        assert!(broker.topics().is_empty());
    }

    #[test]
    fn test_close_topic_unknown() {
        let broker: Broker<Color, u32> = Broker::new();
        assert!(!broker.close_topic(&Color::Blue));
    }

    #[test]
    fn test_topic_reopens_after_close_topic() {
        let broker: Broker<Color, u32> = Broker::new();
        broker.publish(&Color::Red, 1);
        assert!(broker.close_topic(&Color::Red));

        let (rx, _cancel) = broker.subscribe(&Color::Red);
        broker.publish(&Color::Red, 2);
        broker.close();
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![2]);
    }
}

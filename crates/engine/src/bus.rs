// In crates/engine/src/bus.rs

use core_types::{Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc, watch};

/// Default capacity of each subscriber queue.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Opaque handle returned by [`SignalBus::subscribe`] and required to unsubscribe.
pub type SubscriptionId = u64;

/// One subscriber's end of the bus.
#[derive(Debug)]
pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<T>,
}

/// Resolves once the upstream owning this token has been cancelled.
#[derive(Debug)]
pub struct Cancellation(watch::Receiver<()>);

impl Cancellation {
    pub async fn cancelled(&mut self) {
        // The sender is only ever dropped, never written to.
        while self.0.changed().await.is_ok() {}
    }
}

#[derive(Debug)]
struct Subscriber<T> {
    id: SubscriptionId,
    /// `None` once the upstream that fed this subscriber has ended.
    sender: Option<mpsc::Sender<T>>,
}

#[derive(Debug)]
struct Entry<T> {
    generation: u64,
    subscribers: Vec<Subscriber<T>>,
    /// Dropping this cancels the running upstream.
    cancel: Option<watch::Sender<()>>,
}

type Registry<K, T> = Arc<RwLock<HashMap<K, Entry<T>>>>;

/// Per-configuration fan-out of one shared upstream computation.
///
/// The first subscription for a key starts the upstream; every subscriber of
/// that key then receives the same values in arrival order. Delivery blocks:
/// a full subscriber queue makes the upstream wait. Removing the last
/// subscriber cancels the upstream and releases the key's state.
#[derive(Debug)]
pub struct SignalBus<K, T> {
    entries: Registry<K, T>,
    capacity: usize,
    next_id: AtomicU64,
    next_generation: AtomicU64,
}

impl<K, T> Default for SignalBus<K, T>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl<K, T> SignalBus<K, T>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Adds a subscriber for `key`, starting the upstream with `start` when
    /// none is running.
    ///
    /// `start` acquires the upstream's resources and returns the task that
    /// drives it; the bus spawns that task. A failing `start` is returned to
    /// this caller and registers nothing.
    pub async fn subscribe<F, Fut, Task>(&self, key: K, start: F) -> Result<Subscription<T>>
    where
        F: FnOnce(Publisher<K, T>, Cancellation) -> Fut + Send,
        Fut: Future<Output = Result<Task>> + Send,
        Task: Future<Output = ()> + Send + 'static,
    {
        let mut entries = self.entries.write().await;
        let running = entries.get(&key).is_some_and(|entry| entry.cancel.is_some());

        if !running {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let (cancel_tx, cancel_rx) = watch::channel(());
            let publisher = Publisher {
                key: key.clone(),
                generation,
                entries: Arc::clone(&self.entries),
            };

            let task = start(publisher.clone(), Cancellation(cancel_rx)).await?;
            tokio::spawn(async move {
                task.await;
                publisher.finish().await;
            });
            tracing::info!(?key, generation, "Upstream started.");

            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                generation,
                subscribers: Vec::new(),
                cancel: None,
            });
            entry.generation = generation;
            entry.cancel = Some(cancel_tx);
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = entries
            .get_mut(&key)
            .ok_or_else(|| Error::NotFound(format!("no upstream registered for {:?}", key)))?;
        entry.subscribers.push(Subscriber {
            id,
            sender: Some(sender),
        });
        tracing::debug!(?key, subscription = id, subscribers = entry.subscribers.len(), "Subscribed.");

        Ok(Subscription { id, receiver })
    }

    /// Removes one subscriber. The last one out cancels the upstream.
    ///
    /// Callers must also drop the subscription's receiver. A publish already
    /// holding its sender keeps waiting on that queue while it is full.
    pub async fn unsubscribe(&self, key: &K, id: SubscriptionId) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("no subscriptions for {:?}", key)))?;
        let position = entry
            .subscribers
            .iter()
            .position(|subscriber| subscriber.id == id)
            .ok_or_else(|| Error::NotFound(format!("unknown subscription {} for {:?}", id, key)))?;
        entry.subscribers.remove(position);

        if entry.subscribers.is_empty() {
            entries.remove(key);
            tracing::info!(?key, "Last subscriber left; upstream cancelled.");
        } else {
            tracing::debug!(?key, subscription = id, "Unsubscribed.");
        }
        Ok(())
    }

    pub async fn subscriber_count(&self, key: &K) -> usize {
        self.entries.read().await.get(key).map_or(0, |entry| entry.subscribers.len())
    }

    /// Returns `true` while an upstream is running for `key`.
    pub async fn is_running(&self, key: &K) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.cancel.is_some())
    }
}

/// The upstream's handle for delivering values to the subscribers of its key.
#[derive(Debug)]
pub struct Publisher<K, T> {
    key: K,
    generation: u64,
    entries: Registry<K, T>,
}

impl<K: Clone, T> Clone for Publisher<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            generation: self.generation,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K, T> Publisher<K, T>
where
    K: Eq + Hash + Debug,
    T: Clone,
{
    /// Delivers `value` to every current subscriber, waiting for queue space.
    ///
    /// Returns `false` once this upstream has been cancelled or replaced.
    pub async fn publish(&self, value: T) -> bool {
        let senders: Vec<mpsc::Sender<T>> = {
            let entries = self.entries.read().await;
            match entries.get(&self.key) {
                Some(entry) if entry.generation == self.generation && entry.cancel.is_some() => entry
                    .subscribers
                    .iter()
                    .filter_map(|subscriber| subscriber.sender.clone())
                    .collect(),
                _ => return false,
            }
        };

        for sender in senders {
            // A dropped receiver only means that subscriber stopped listening.
            let _ = sender.send(value.clone()).await;
        }
        true
    }

    /// Closes every subscriber queue after the upstream ended by itself.
    async fn finish(&self) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&self.key) {
            if entry.generation != self.generation {
                return;
            }
            entry.cancel = None;
            for subscriber in &mut entry.subscribers {
                subscriber.sender = None;
            }
            tracing::warn!(key = ?self.key, generation = self.generation, "Upstream ended; subscriber queues closed.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{Duration, timeout};

    type Bus = SignalBus<&'static str, u32>;

    /// Starts an upstream that forwards `source` until cancelled.
    async fn subscribe_forwarding(
        bus: &Bus,
        key: &'static str,
        source: mpsc::Receiver<u32>,
        starts: Arc<AtomicUsize>,
    ) -> Result<Subscription<u32>> {
        bus.subscribe(key, move |publisher, mut cancel| async move {
            starts.fetch_add(1, Ordering::SeqCst);
            let mut source = source;
            Ok::<_, Error>(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        value = source.recv() => match value {
                            Some(value) => {
                                if !publisher.publish(value).await {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            })
        })
        .await
    }

    #[tokio::test]
    async fn shared_upstream_fans_out_to_all_subscribers() {
        let bus = Bus::new(4);
        let starts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let (_unused_tx, unused_rx) = mpsc::channel(4);

        let mut first = subscribe_forwarding(&bus, "sma", rx, starts.clone()).await.unwrap();
        let mut second = subscribe_forwarding(&bus, "sma", unused_rx, starts.clone()).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_ne!(first.id, second.id);

        tx.send(7).await.unwrap();
        assert_eq!(first.receiver.recv().await, Some(7));
        assert_eq!(second.receiver.recv().await, Some(7));
    }

    #[tokio::test]
    async fn unknown_handles_are_not_found() {
        let bus = Bus::new(4);
        let (_tx, rx) = mpsc::channel(4);
        let sub = subscribe_forwarding(&bus, "sma", rx, Arc::default()).await.unwrap();

        assert!(matches!(bus.unsubscribe(&"sma", sub.id + 100).await, Err(Error::NotFound(_))));
        assert!(matches!(bus.unsubscribe(&"other", sub.id).await, Err(Error::NotFound(_))));
        assert!(bus.unsubscribe(&"sma", sub.id).await.is_ok());
        assert!(matches!(bus.unsubscribe(&"sma", sub.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn last_unsubscribe_cancels_upstream() {
        let bus = Bus::new(4);
        let (tx, rx) = mpsc::channel(4);
        let (_unused_tx, unused_rx) = mpsc::channel(4);
        let first = subscribe_forwarding(&bus, "sma", rx, Arc::default()).await.unwrap();
        let second = subscribe_forwarding(&bus, "sma", unused_rx, Arc::default()).await.unwrap();

        bus.unsubscribe(&"sma", first.id).await.unwrap();
        assert!(bus.is_running(&"sma").await);

        bus.unsubscribe(&"sma", second.id).await.unwrap();
        assert!(!bus.is_running(&"sma").await);
        assert_eq!(bus.subscriber_count(&"sma").await, 0);

        // The cancelled task drops its source receiver.
        timeout(Duration::from_secs(1), tx.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn start_failure_reaches_first_subscriber_only() {
        let bus = Bus::new(4);
        let failed = bus
            .subscribe("sma", |_publisher, _cancel| async {
                Err::<std::future::Ready<()>, _>(Error::Upstream("feed unavailable".to_string()))
            })
            .await;
        assert!(matches!(failed, Err(Error::Upstream(_))));
        assert_eq!(bus.subscriber_count(&"sma").await, 0);

        let (_tx, rx) = mpsc::channel(4);
        let starts = Arc::new(AtomicUsize::new(0));
        subscribe_forwarding(&bus, "sma", rx, starts.clone()).await.unwrap();
        let (_tx2, rx2) = mpsc::channel(4);
        subscribe_forwarding(&bus, "sma", rx2, starts.clone()).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn upstream_end_closes_queues_and_next_subscribe_restarts() {
        let bus = Bus::new(4);
        let starts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(4);
        let mut first = subscribe_forwarding(&bus, "sma", rx, starts.clone()).await.unwrap();

        drop(tx);
        assert_eq!(timeout(Duration::from_secs(1), first.receiver.recv()).await.unwrap(), None);
        assert!(!bus.is_running(&"sma").await);
        assert_eq!(bus.subscriber_count(&"sma").await, 1);

        let (tx, rx) = mpsc::channel(4);
        let mut second = subscribe_forwarding(&bus, "sma", rx, starts.clone()).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        tx.send(3).await.unwrap();
        assert_eq!(second.receiver.recv().await, Some(3));

        bus.unsubscribe(&"sma", first.id).await.unwrap();
        assert!(bus.is_running(&"sma").await);
    }

    #[tokio::test]
    async fn full_queue_blocks_the_producer() {
        let bus = Bus::new(1);
        let (tx, rx) = mpsc::channel(8);
        let mut sub = subscribe_forwarding(&bus, "sma", rx, Arc::default()).await.unwrap();

        for value in 0..4 {
            tx.send(value).await.unwrap();
        }
        // Nothing is dropped: every value arrives in order once the subscriber reads.
        for expected in 0..4 {
            let value = timeout(Duration::from_secs(1), sub.receiver.recv()).await.unwrap();
            assert_eq!(value, Some(expected));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_stalls_others_until_released() {
        let bus = Bus::new(1);
        let (tx, rx) = mpsc::channel(8);
        let (_unused_tx, unused_rx) = mpsc::channel(8);
        let slow = subscribe_forwarding(&bus, "sma", rx, Arc::default()).await.unwrap();
        let mut fast = subscribe_forwarding(&bus, "sma", unused_rx, Arc::default()).await.unwrap();

        for value in 0..3 {
            tx.send(value).await.unwrap();
        }
        assert_eq!(fast.receiver.recv().await, Some(0));
        // The upstream is parked on the slow subscriber's full queue.
        assert!(timeout(Duration::from_millis(50), fast.receiver.recv()).await.is_err());

        bus.unsubscribe(&"sma", slow.id).await.unwrap();
        drop(slow);
        for expected in 1..3 {
            let value = timeout(Duration::from_secs(1), fast.receiver.recv()).await.unwrap();
            assert_eq!(value, Some(expected));
        }
    }
}

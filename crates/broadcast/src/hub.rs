use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::debug;

use crate::{HubError, Result};

pub const DEFAULT_BUFFER_SIZE: usize = 100;

struct Subscriber<T> {
    /// `None` once the subscriber is stopped.
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>,
    stopped: watch::Sender<bool>,
}

impl<T> Subscriber<T> {
    fn new(buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (stopped, _) = watch::channel(false);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(AsyncMutex::new(receiver)),
            stopped,
        }
    }

    fn stop(&self) {
        self.sender.lock().take();
        self.stopped.send_replace(true);
    }

    /// Waits for buffer space unless the subscriber is stopped meanwhile.
    async fn send_wait(&self, message: T) -> bool {
        let Some(sender) = self.sender.lock().clone() else {
            return false;
        };
        let mut stopped = self.stopped.subscribe();
        tokio::select! {
            sent = sender.send(message) => sent.is_ok(),
            _ = stopped.wait_for(|stopped| *stopped) => false,
        }
    }
}

/// Receiving end of one subscriber. Clones share the same channel.
pub struct Subscription<T> {
    id: String,
    receiver: Arc<AsyncMutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> Subscription<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next message, or `None` once the subscriber was removed and its
    /// buffer is drained.
    pub async fn recv(&self) -> Option<T> {
        self.receiver.lock().await.recv().await
    }

    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Whether both handles read from the same channel.
    pub fn same_channel(&self, other: &Subscription<T>) -> bool {
        Arc::ptr_eq(&self.receiver, &other.receiver)
    }
}

/// Fan-out of `T` to named subscribers, each with its own bounded buffer.
///
/// Each subscriber sees messages in broadcast order. [`Hub::broadcast`]
/// never waits: a subscriber whose buffer is full misses the message while
/// everyone else still gets it.
pub struct Hub<T> {
    subscribers: RwLock<HashMap<String, Arc<Subscriber<T>>>>,
    buffer_size: usize,
    max_subscribers: usize,
}

impl<T> Default for Hub<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl<T> Hub<T> {
    /// Hub without a subscriber limit.
    pub fn new(buffer_size: usize) -> Self {
        Self::with_limit(buffer_size, 0)
    }

    /// `max_subscribers == 0` means unlimited.
    pub fn with_limit(buffer_size: usize, max_subscribers: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
            max_subscribers,
        }
    }

    /// Registers `id`, or returns its existing subscription.
    pub fn subscribe(&self, id: impl Into<String>) -> Result<Subscription<T>> {
        let id = id.into();
        let mut subscribers = self.subscribers.write();

        if let Some(existing) = subscribers.get(&id) {
            return Ok(Subscription {
                id,
                receiver: existing.receiver.clone(),
            });
        }
        if self.max_subscribers > 0 && subscribers.len() >= self.max_subscribers {
            return Err(HubError::ResourceExhausted {
                limit: self.max_subscribers,
            });
        }

        let subscriber = Arc::new(Subscriber::new(self.buffer_size));
        let receiver = subscriber.receiver.clone();
        subscribers.insert(id.clone(), subscriber);
        debug!(subscriber = %id, total = subscribers.len(), "Subscribed");

        Ok(Subscription { id, receiver })
    }

    /// Removes `id` and closes its channel. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &str) {
        let removed = self.subscribers.write().remove(id);
        if let Some(subscriber) = removed {
            subscriber.stop();
            debug!(subscriber = %id, "Unsubscribed");
        }
    }

    fn unsubscribe_channel(&self, subscription: &Subscription<T>) {
        let mut subscribers = self.subscribers.write();
        let owns_entry = subscribers
            .get(subscription.id())
            .map(|s| Arc::ptr_eq(&s.receiver, &subscription.receiver))
            .unwrap_or(false);
        if owns_entry {
            if let Some(subscriber) = subscribers.remove(subscription.id()) {
                subscriber.stop();
                debug!(subscriber = %subscription.id(), "Unsubscribed");
            }
        }
    }

    pub fn count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Stops every subscriber. The hub stays usable.
    pub fn close(&self) {
        let drained: Vec<_> = self.subscribers.write().drain().collect();
        for (_, subscriber) in &drained {
            subscriber.stop();
        }
        debug!(closed = drained.len(), "Closed hub");
    }
}

impl<T: Clone + Send> Hub<T> {
    /// Offers `message` to every subscriber without waiting. Returns how
    /// many subscribers accepted it.
    pub fn broadcast(&self, message: T) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;

        for (id, subscriber) in subscribers.iter() {
            let sender = subscriber.sender.lock();
            let Some(sender) = sender.as_ref() else {
                continue;
            };
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = %id, "Subscriber buffer full, dropping message")
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }

        delivered
    }

    /// Delivers `message` to every current subscriber, waiting for buffer
    /// space. A subscriber removed while waited on is skipped.
    pub async fn broadcast_wait(&self, message: T) -> usize {
        let targets: Vec<_> = self.subscribers.read().values().cloned().collect();
        let sends = targets.into_iter().map(|subscriber| {
            let message = message.clone();
            async move { subscriber.send_wait(message).await }
        });

        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }

    /// Receive loop of one subscription. Hands every message to `deliver`
    /// until `shutdown` resolves, the channel closes or `deliver` fails, and
    /// unsubscribes on the way out.
    pub async fn serve<S, F, Fut, E>(
        &self,
        subscription: Subscription<T>,
        shutdown: S,
        mut deliver: F,
    ) -> std::result::Result<(), E>
    where
        S: Future<Output = ()>,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                message = subscription.recv() => match message {
                    Some(message) => {
                        if let Err(e) = deliver(message).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
            }
        };

        self.unsubscribe_channel(&subscription);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_slow_subscriber_is_isolated() {
        let hub = Hub::new(1);
        let slow = hub.subscribe("slow").unwrap();
        let fast = hub.subscribe("fast").unwrap();

        assert_eq!(hub.broadcast(1u32), 2);
        assert_eq!(fast.recv().await, Some(1));
        assert_eq!(hub.broadcast(2u32), 1);
        assert_eq!(fast.recv().await, Some(2));

        assert_eq!(slow.try_recv(), Some(1));
        assert_eq!(slow.try_recv(), None);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_only_for_idle_subscriber() {
        let hub = Hub::new(1);
        let idle = hub.subscribe("idle").unwrap();
        let draining = hub.subscribe("draining").unwrap();

        let (drained_tx, drained_rx) = oneshot::channel();
        let mut drained_tx = Some(drained_tx);
        let drain = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(message) = draining.recv().await {
                received.push(message);
                if received.len() == 1 {
                    if let Some(tx) = drained_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }
            received
        });

        assert_eq!(hub.broadcast(1u32), 2);
        drained_rx.await.unwrap();
        assert_eq!(hub.broadcast(2u32), 1);

        hub.close();
        assert_eq!(drain.await.unwrap(), vec![1, 2]);
        assert_eq!(idle.recv().await, Some(1));
        assert_eq!(idle.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let hub: Hub<u32> = Hub::new(4);
        let first = hub.subscribe("x").unwrap();
        let second = hub.subscribe("x").unwrap();

        assert!(first.same_channel(&second));
        assert_eq!(hub.count(), 1);

        hub.broadcast(7);
        assert_eq!(second.recv().await, Some(7));
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let hub = Hub::new(4);
        let sub = hub.subscribe("a").unwrap();
        hub.broadcast(1u32);

        hub.unsubscribe("a");
        hub.unsubscribe("a");
        hub.unsubscribe("unknown");

        assert_eq!(hub.count(), 0);
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
        assert_eq!(hub.broadcast(2), 0);
    }

    #[tokio::test]
    async fn test_close_then_reuse() {
        let hub = Hub::new(4);
        let a = hub.subscribe("a").unwrap();
        let _b = hub.subscribe("b").unwrap();

        hub.close();
        assert_eq!(hub.count(), 0);
        assert_eq!(a.recv().await, None);

        let again = hub.subscribe("a").unwrap();
        assert!(!again.same_channel(&a));
        hub.broadcast(5u32);
        assert_eq!(again.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_subscriber_limit() {
        let hub: Hub<u32> = Hub::with_limit(1, 2);
        hub.subscribe("a").unwrap();
        hub.subscribe("b").unwrap();

        assert_eq!(
            hub.subscribe("c").err(),
            Some(HubError::ResourceExhausted { limit: 2 })
        );
        assert!(hub.subscribe("a").is_ok());

        hub.unsubscribe("b");
        assert!(hub.subscribe("c").is_ok());
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let hub = Hub::new(16);
        let sub = hub.subscribe("a").unwrap();
        for i in 0..10u32 {
            hub.broadcast(i);
        }
        for i in 0..10u32 {
            assert_eq!(sub.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn test_broadcast_wait_blocks_until_space() {
        let hub = Arc::new(Hub::new(1));
        let sub = hub.subscribe("a").unwrap();
        hub.broadcast(1u32);

        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.broadcast_wait(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(waiter.await.unwrap(), 1);
        assert_eq!(sub.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_broadcast_wait_skips_removed_subscriber() {
        let hub = Arc::new(Hub::new(1));
        let _stuck = hub.subscribe("stuck").unwrap();
        hub.broadcast(1u32);

        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.broadcast_wait(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.unsubscribe("stuck");

        let delivered = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("broadcast_wait did not return")
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_broadcast_and_unsubscribe() {
        let hub = Arc::new(Hub::new(8));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for i in 0..500u32 {
                        hub.broadcast(i);
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();

        let churn = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for round in 0..200 {
                    let id = format!("sub-{}", round % 10);
                    let sub = hub.subscribe(id.clone()).unwrap();
                    let _ = sub.try_recv();
                    hub.unsubscribe(&id);
                    tokio::task::yield_now().await;
                }
            })
        };

        for producer in producers {
            producer.await.unwrap();
        }
        churn.await.unwrap();
        assert_eq!(hub.count(), 0);
    }

    #[tokio::test]
    async fn test_serve_unsubscribes_on_shutdown() {
        let hub = Arc::new(Hub::new(4));
        let sub = hub.subscribe("stream").unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let server = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let shutdown = async {
                    let _ = stop_rx.await;
                };
                hub.serve(sub, shutdown, |message: u32| {
                    let seen_tx = seen_tx.clone();
                    async move { seen_tx.send(message).map_err(|_| "closed") }
                })
                .await
            })
        };

        hub.broadcast(3u32);
        assert_eq!(seen_rx.recv().await, Some(3));

        stop_tx.send(()).unwrap();
        assert_eq!(server.await.unwrap(), Ok(()));
        assert_eq!(hub.count(), 0);
    }

    #[tokio::test]
    async fn test_serve_failure_unsubscribes() {
        let hub = Hub::new(4);
        let sub = hub.subscribe("stream").unwrap();
        hub.broadcast(1u32);

        let result = hub
            .serve(sub, futures::future::pending(), |_| async { Err("peer gone") })
            .await;

        assert_eq!(result, Err("peer gone"));
        assert_eq!(hub.count(), 0);
    }
}

//! In-process fan-out. Single-writer/many-reader on the subscription
//! registry; a send failure (receiver dropped) prunes the subscriber
//! on the next publish rather than eagerly, matching §5's "lazy
//! removal on send failure."

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{BroadcastEvent, BroadcastGateway, Subscription};

const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    subscription: Subscription,
    sender: mpsc::Sender<BroadcastEvent>,
}

#[derive(Default)]
pub struct InMemoryBroadcastGateway {
    subscribers: Mutex<HashMap<Uuid, Entry>>,
}

impl InMemoryBroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadcastGateway for InMemoryBroadcastGateway {
    fn publish(&self, event: BroadcastEvent) {
        let job_id = event.job_id();
        let now = Utc::now();

        let targets: Vec<(Uuid, mpsc::Sender<BroadcastEvent>)> = {
            let subscribers = self.subscribers.lock().expect("broadcast registry poisoned");
            subscribers
                .values()
                .filter(|entry| entry.subscription.job_id == job_id && entry.subscription.expires_at > now)
                .map(|entry| (entry.subscription.id, entry.sender.clone()))
                .collect()
        };

        for (subscription_id, sender) in targets {
            let event = event.clone();
            // Scheduled on a detached task per §4.3: the orchestration
            // path never awaits subscriber delivery.
            tokio::spawn(async move {
                if sender.send(event).await.is_err() {
                    debug!(%subscription_id, "broadcast send failed, subscriber gone");
                }
            });
        }
    }

    fn subscribe(&self, job_id: Uuid, ttl_secs: i64) -> (Uuid, mpsc::Receiver<BroadcastEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let subscription_id = Uuid::new_v4();
        let subscription = Subscription {
            id: subscription_id,
            job_id,
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs),
        };
        self.subscribers
            .lock()
            .expect("broadcast registry poisoned")
            .insert(subscription_id, Entry { subscription, sender: tx });
        (subscription_id, rx)
    }

    fn unsubscribe(&self, subscription_id: Uuid) {
        self.subscribers
            .lock()
            .expect("broadcast registry poisoned")
            .remove(&subscription_id);
    }

    fn subscriber_count(&self) -> usize {
        let now = Utc::now();
        self.subscribers
            .lock()
            .expect("broadcast registry poisoned")
            .values()
            .filter(|entry| entry.subscription.expires_at > now)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::LogLevel;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let gateway = InMemoryBroadcastGateway::new();
        let job_id = Uuid::new_v4();
        let (_sub_id, mut rx) = gateway.subscribe(job_id, 60);

        gateway.publish(BroadcastEvent::log(job_id, "started", LogLevel::Info));

        let received = rx.recv().await.expect("event delivered");
        assert_eq!(received.job_id(), job_id);
    }

    #[tokio::test]
    async fn publish_never_blocks_with_no_subscribers() {
        let gateway = InMemoryBroadcastGateway::new();
        gateway.publish(BroadcastEvent::log(Uuid::new_v4(), "noop", LogLevel::Info));
        assert_eq!(gateway.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_registration() {
        let gateway = InMemoryBroadcastGateway::new();
        let job_id = Uuid::new_v4();
        let (sub_id, _rx) = gateway.subscribe(job_id, 60);
        assert_eq!(gateway.subscriber_count(), 1);
        gateway.unsubscribe(sub_id);
        assert_eq!(gateway.subscriber_count(), 0);
    }
}

//! In-memory reference implementation: a FIFO backlog plus an
//! in-flight map keyed by receipt, visibility timeouts enforced by
//! wall-clock comparison rather than a real scheduler.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use atlas_types::{AtlasError, WorkItem};

use crate::{QueueGateway, ReceivedItem, Receipt, MAX_DELIVERY_ATTEMPTS};

struct InFlight {
    item: WorkItem,
    visible_at: Instant,
    attempt: u32,
}

#[derive(Default)]
struct State {
    backlog: VecDeque<WorkItem>,
    in_flight: HashMap<String, InFlight>,
    dead_letters: Vec<WorkItem>,
}

#[derive(Default)]
pub struct InMemoryQueueGateway {
    state: Mutex<State>,
}

impl InMemoryQueueGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move any in-flight items whose visibility has expired back
    /// onto the backlog. Called opportunistically on `receive()`
    /// rather than by a background task, to keep the fake dependency-
    /// free.
    fn reap_expired(state: &mut State) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, v)| v.visible_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for receipt in expired {
            if let Some(entry) = state.in_flight.remove(&receipt) {
                if entry.attempt >= MAX_DELIVERY_ATTEMPTS {
                    state.dead_letters.push(entry.item);
                } else {
                    state.backlog.push_back(entry.item);
                }
            }
        }
    }
}

#[async_trait]
impl QueueGateway for InMemoryQueueGateway {
    async fn enqueue(&self, item: WorkItem) -> Result<(), AtlasError> {
        let mut state = self.state.lock().await;
        state.backlog.push_back(item);
        Ok(())
    }

    async fn receive(&self, visibility_timeout_secs: u64) -> Result<Option<ReceivedItem>, AtlasError> {
        let mut state = self.state.lock().await;
        Self::reap_expired(&mut state);

        let Some(item) = state.backlog.pop_front() else {
            return Ok(None);
        };

        let receipt = Receipt(Uuid::new_v4().to_string());
        let attempt = 1;
        state.in_flight.insert(
            receipt.0.clone(),
            InFlight {
                item: item.clone(),
                visible_at: Instant::now() + Duration::from_secs(visibility_timeout_secs),
                attempt,
            },
        );

        Ok(Some(ReceivedItem {
            item,
            receipt,
            delivery_attempt: attempt,
        }))
    }

    async fn ack(&self, receipt: &Receipt) -> Result<(), AtlasError> {
        self.state.lock().await.in_flight.remove(&receipt.0);
        Ok(())
    }

    async fn fail(&self, receipt: &Receipt) -> Result<(), AtlasError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.in_flight.remove(&receipt.0) {
            if entry.attempt >= MAX_DELIVERY_ATTEMPTS {
                state.dead_letters.push(entry.item);
            } else {
                state.backlog.push_back(entry.item);
            }
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Vec<WorkItem> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::{JobParams, JobType};

    fn sample_item() -> WorkItem {
        WorkItem::new(Uuid::new_v4(), JobType::SyncExtract, JobParams::default())
    }

    #[tokio::test]
    async fn enqueue_then_receive_round_trips() {
        let queue = InMemoryQueueGateway::new();
        queue.enqueue(sample_item()).await.unwrap();
        let received = queue.receive(60).await.unwrap();
        assert!(received.is_some());
    }

    #[tokio::test]
    async fn ack_removes_in_flight_item() {
        let queue = InMemoryQueueGateway::new();
        queue.enqueue(sample_item()).await.unwrap();
        let received = queue.receive(60).await.unwrap().unwrap();
        queue.ack(&received.receipt).await.unwrap();
        assert!(queue.receive(60).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_requeues_for_redelivery() {
        let queue = InMemoryQueueGateway::new();
        queue.enqueue(sample_item()).await.unwrap();
        let received = queue.receive(60).await.unwrap().unwrap();
        queue.fail(&received.receipt).await.unwrap();
        let redelivered = queue.receive(60).await.unwrap();
        assert!(redelivered.is_some());
    }
}

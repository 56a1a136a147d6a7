//! Per-host politeness delay between agents hitting the same site
//! (§4.7). A single shared gate per pool: the first agent to touch a
//! host passes through immediately, later agents for the same host
//! wait out the delay since the previous one was admitted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct PolitenessGate {
    delay: Duration,
    last_seen: Arc<Mutex<HashMap<String, Instant>>>,
}

impl PolitenessGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn wait_for_host(&self, url: &str) {
        let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            return;
        };

        let wait = {
            let mut last_seen = self.last_seen.lock().await;
            let now = Instant::now();
            let wait = last_seen
                .get(&host)
                .map(|previous| self.delay.saturating_sub(now.duration_since(*previous)))
                .unwrap_or_default();
            last_seen.insert(host, now + wait);
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for PolitenessGate {
    fn default() -> Self {
        Self::new(DEFAULT_POLITENESS_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_to_a_host_never_waits() {
        let gate = PolitenessGate::new(Duration::from_secs(10));
        let started = Instant::now();
        gate.wait_for_host("https://example.com/a").await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn different_hosts_never_wait_on_each_other() {
        let gate = PolitenessGate::new(Duration::from_secs(10));
        gate.wait_for_host("https://a.example").await;
        let started = Instant::now();
        gate.wait_for_host("https://b.example").await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}

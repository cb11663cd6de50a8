use crate::token_bucket::TokenBucket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Per-identity token-bucket throttle, local to this process.
///
/// Buckets are created full on an identity's first request and dropped by
/// the eviction sweep once idle for longer than the configured TTL.
#[derive(Clone)]
pub struct AdmissionGate {
    rate: f64,
    burst: u32,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl AdmissionGate {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Refill the identity's bucket and try to take one token.
    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    pub fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut buckets = self.lock();
        match buckets.get_mut(identity) {
            Some(bucket) => bucket.try_consume(1, now),
            None => {
                let mut bucket = TokenBucket::new(self.burst, self.rate, now);
                let admitted = bucket.try_consume(1, now);
                buckets.insert(identity.to_string(), bucket);
                admitted
            }
        }
    }

    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }

    /// Remove every bucket not seen within `ttl`. Returns how many went.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        self.evict_idle_at(Instant::now(), ttl)
    }

    pub fn evict_idle_at(&self, now: Instant, ttl: Duration) -> usize {
        let Some(cutoff) = now.checked_sub(ttl) else {
            return 0;
        };

        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.idle_since(cutoff));
        before - buckets.len()
    }

    /// Spawn the periodic sweep. Runs every `ttl` until the handle is stopped.
    pub fn start_eviction(&self, ttl: Duration) -> EvictionHandle {
        let gate = self.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + ttl, ttl);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = gate.evict_idle(ttl);
                        if evicted > 0 {
                            debug!(evicted, remaining = gate.tracked_identities(), "Evicted idle rate limit buckets");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        info!(ttl_secs = ttl.as_secs_f64(), "Started rate limit bucket eviction");
        EvictionHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    // Bucket updates never panic mid-way, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stops the eviction sweep started by [`AdmissionGate::start_eviction`].
pub struct EvictionHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EvictionHandle {
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
        info!("Stopped rate limit bucket eviction");
    }
}

impl Drop for EvictionHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_throttle_then_refill() {
        let gate = AdmissionGate::new(10.0, 20);
        let start = Instant::now();

        for _ in 0..20 {
            assert!(gate.admit_at("10.0.0.1", start));
        }
        assert!(!gate.admit_at("10.0.0.1", start));

        let later = start + Duration::from_millis(100);
        assert!(gate.admit_at("10.0.0.1", later));
        assert!(!gate.admit_at("10.0.0.1", later));
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = AdmissionGate::new(1.0, 1);
        let now = Instant::now();

        assert!(gate.admit_at("10.0.0.1", now));
        assert!(!gate.admit_at("10.0.0.1", now));
        assert!(gate.admit_at("10.0.0.2", now));
        assert_eq!(gate.tracked_identities(), 2);
    }

    #[test]
    fn test_evict_idle_only_removes_stale_buckets() {
        let gate = AdmissionGate::new(1.0, 3);
        let start = Instant::now();
        let ttl = Duration::from_secs(60);

        gate.admit_at("stale", start);
        gate.admit_at("fresh", start + Duration::from_secs(50));

        assert_eq!(gate.evict_idle_at(start + Duration::from_secs(61), ttl), 1);
        assert_eq!(gate.tracked_identities(), 1);
        assert_eq!(gate.evict_idle_at(start + Duration::from_secs(111), ttl), 1);
        assert_eq!(gate.tracked_identities(), 0);
    }

    #[test]
    fn test_evicted_identity_starts_with_full_burst() {
        let gate = AdmissionGate::new(0.0, 2);
        let start = Instant::now();
        let ttl = Duration::from_secs(1);

        assert!(gate.admit_at("10.0.0.1", start));
        assert!(gate.admit_at("10.0.0.1", start));
        assert!(!gate.admit_at("10.0.0.1", start));

        let later = start + Duration::from_secs(2);
        assert_eq!(gate.evict_idle_at(later, ttl), 1);
        assert!(gate.admit_at("10.0.0.1", later));
        assert!(gate.admit_at("10.0.0.1", later));
        assert!(!gate.admit_at("10.0.0.1", later));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts_idle_buckets() {
        let gate = AdmissionGate::new(0.0, 3);
        for _ in 0..3 {
            assert!(gate.admit("10.0.0.1"));
        }
        assert!(!gate.admit("10.0.0.1"));

        let handle = gate.start_eviction(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(gate.tracked_identities(), 0);
        for _ in 0..3 {
            assert!(gate.admit("10.0.0.1"));
        }

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_sweep_leaves_buckets_alone() {
        let gate = AdmissionGate::new(1.0, 1);
        let handle = gate.start_eviction(Duration::from_secs(1));
        handle.stop().await;

        gate.admit("10.0.0.1");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(gate.tracked_identities(), 1);
    }
}

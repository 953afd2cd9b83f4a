//! Async, circuit-broken writer in front of the analytics store.
//!
//! The shipper never blocks the emitter: documents go into a bounded
//! drop-oldest queue and a single worker drains it. Failures are silent but
//! deterministic — after `failure_threshold` consecutive failures the
//! circuit opens for `cooldown`; while open, writes are dropped with at most
//! one warning per cooldown interval; a single success closes the circuit
//! and resets the failure counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use axon_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend contracts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The index-document surface of the analytics store.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn index_document(&self, index: &str, document: Value) -> Result<()>;
}

/// A store handler the shipper can be built from. The shipper is created
/// iff the handler reports a connected state and exposes an index backend.
pub trait StoreHandler {
    fn connected(&self) -> bool;
    fn index_backend(&self) -> Option<Arc<dyn IndexBackend>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Circuit breaker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Consecutive-failure circuit breaker.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
    last_warn: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
            last_warn: Mutex::new(None),
        }
    }

    /// Whether a write attempt is allowed right now. The circuit stays
    /// closed, or has been open for at least the full cooldown window
    /// (half-open: one probe attempt is let through).
    pub fn allow(&self, now: Instant) -> bool {
        match *self.open_until.lock() {
            Some(until) => now >= until,
            None => true,
        }
    }

    /// True while the cooldown window is still running.
    pub fn is_open(&self, now: Instant) -> bool {
        !self.allow(now)
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Record a failed write; opens the circuit at the threshold.
    pub fn record_failure(&self, now: Instant) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            let mut open_until = self.open_until.lock();
            if open_until.map_or(true, |until| now >= until) {
                *open_until = Some(now + self.cooldown);
                tracing::warn!(
                    failures,
                    cooldown_secs = self.cooldown.as_secs_f64(),
                    "index shipper circuit opened"
                );
            }
        }
    }

    /// Record a successful write; closes the circuit and resets the counter.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        let mut open_until = self.open_until.lock();
        if open_until.take().is_some() {
            tracing::info!("index shipper circuit closed");
        }
    }

    /// Rate-limited warning hook: true at most once per cooldown interval.
    fn should_warn(&self, now: Instant) -> bool {
        let mut last = self.last_warn.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shipper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub queue_capacity: usize,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            queue_capacity: 1024,
        }
    }
}

/// Bounded push: drop the oldest element when at capacity. Returns the
/// dropped element, if any.
fn push_drop_oldest<T>(queue: &mut VecDeque<T>, capacity: usize, item: T) -> Option<T> {
    let dropped = if queue.len() >= capacity {
        queue.pop_front()
    } else {
        None
    };
    queue.push_back(item);
    dropped
}

/// Async writer with a bounded queue and the circuit breaker above.
pub struct IndexShipper {
    backend: Arc<dyn IndexBackend>,
    queue: Mutex<VecDeque<(String, Value)>>,
    notify: Notify,
    breaker: CircuitBreaker,
    capacity: usize,
    dropped: AtomicU64,
}

impl IndexShipper {
    /// Create the shipper and spawn its worker. Must be called from within
    /// a tokio runtime.
    pub fn new(backend: Arc<dyn IndexBackend>, config: ShipperConfig) -> Arc<Self> {
        let shipper = Arc::new(Self {
            backend,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            breaker: CircuitBreaker::new(config.failure_threshold, config.cooldown),
            capacity: config.queue_capacity,
            dropped: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&shipper);
        tokio::spawn(async move { worker(weak).await });

        shipper
    }

    /// Build from a store handler iff it is connected and exposes an index
    /// backend.
    pub fn from_handler(handler: &dyn StoreHandler, config: ShipperConfig) -> Option<Arc<Self>> {
        if !handler.connected() {
            return None;
        }
        handler.index_backend().map(|backend| Self::new(backend, config))
    }

    /// Enqueue a document for indexing. Never blocks; drops the oldest
    /// queued document on overflow.
    pub fn enqueue(&self, index: String, document: Value) {
        let dropped = {
            let mut queue = self.queue.lock();
            push_drop_oldest(&mut queue, self.capacity, (index, document))
        };
        if dropped.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn drain_one(&self) -> bool {
        let item = self.queue.lock().pop_front();
        let Some((index, document)) = item else {
            return false;
        };

        let now = Instant::now();
        if !self.breaker.allow(now) {
            if self.breaker.should_warn(now) {
                tracing::warn!(index = %index, "index shipper circuit open, dropping writes");
            }
            return true;
        }

        match self.backend.index_document(&index, document).await {
            Ok(()) => self.breaker.record_success(),
            Err(e) => {
                tracing::debug!(index = %index, error = %e, "index write failed");
                self.breaker.record_failure(Instant::now());
            }
        }
        true
    }
}

async fn worker(shipper: Weak<IndexShipper>) {
    loop {
        let Some(strong) = shipper.upgrade() else {
            return;
        };
        if !strong.drain_one().await {
            // Bounded wait so the worker notices a dropped shipper; the
            // strong handle is released at the end of each iteration.
            let _ =
                tokio::time::timeout(Duration::from_secs(1), strong.notify.notified()).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::Error;

    struct FlakyBackend {
        fail: std::sync::atomic::AtomicBool,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail: std::sync::atomic::AtomicBool::new(fail),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IndexBackend for FlakyBackend {
        async fn index_document(&self, index: &str, _document: Value) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Http("boom".into()));
            }
            self.seen.lock().push(index.to_string());
            Ok(())
        }
    }

    #[test]
    fn push_drop_oldest_bounds_queue() {
        let mut queue = VecDeque::new();
        assert!(push_drop_oldest(&mut queue, 2, 1).is_none());
        assert!(push_drop_oldest(&mut queue, 2, 2).is_none());
        let dropped = push_drop_oldest(&mut queue, 2, 3);
        assert_eq!(dropped, Some(1));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn breaker_opens_at_threshold_and_closes_on_success() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        let t0 = Instant::now();

        breaker.record_failure(t0);
        breaker.record_failure(t0);
        assert!(breaker.allow(t0));

        breaker.record_failure(t0);
        assert!(!breaker.allow(t0));
        assert!(breaker.is_open(t0));

        // Still open within the cooldown window.
        assert!(!breaker.allow(t0 + Duration::from_millis(49)));
        // Half-open exactly at the window edge.
        assert!(breaker.allow(t0 + Duration::from_millis(50)));

        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert!(!breaker.is_open(Instant::now()));
    }

    #[test]
    fn breaker_warns_once_per_interval() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(breaker.should_warn(t0));
        assert!(!breaker.should_warn(t0 + Duration::from_millis(10)));
        assert!(breaker.should_warn(t0 + Duration::from_millis(110)));
    }

    #[tokio::test]
    async fn shipper_delivers_documents() {
        let backend = FlakyBackend::new(false);
        let shipper = IndexShipper::new(backend.clone(), ShipperConfig::default());

        shipper.enqueue("axon-events-2026-08-01".into(), serde_json::json!({"a": 1}));
        for _ in 0..50 {
            if !backend.seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.seen.lock().as_slice(), ["axon-events-2026-08-01"]);
    }

    #[tokio::test]
    async fn failing_backend_opens_circuit_then_success_closes_it() {
        let backend = FlakyBackend::new(true);
        let config = ShipperConfig {
            failure_threshold: 3,
            cooldown: Duration::from_millis(40),
            queue_capacity: 16,
        };
        let shipper = IndexShipper::new(backend.clone(), config);

        for i in 0..3 {
            shipper.enqueue("idx".into(), serde_json::json!({ "n": i }));
        }
        for _ in 0..100 {
            if shipper.breaker().is_open(Instant::now()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(shipper.breaker().is_open(Instant::now()));

        // Let the cooldown elapse, then a successful probe closes the circuit.
        backend.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        shipper.enqueue("idx".into(), serde_json::json!({ "n": 99 }));
        for _ in 0..100 {
            if shipper.breaker().failure_count() == 0 && !backend.seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(shipper.breaker().failure_count(), 0);
        assert!(!shipper.breaker().is_open(Instant::now()));
    }

    struct Handler {
        connected: bool,
        backend: Option<Arc<dyn IndexBackend>>,
    }

    impl StoreHandler for Handler {
        fn connected(&self) -> bool {
            self.connected
        }
        fn index_backend(&self) -> Option<Arc<dyn IndexBackend>> {
            self.backend.clone()
        }
    }

    #[tokio::test]
    async fn from_handler_requires_connected_state() {
        let backend: Arc<dyn IndexBackend> = FlakyBackend::new(false);
        let disconnected = Handler {
            connected: false,
            backend: Some(backend.clone()),
        };
        assert!(IndexShipper::from_handler(&disconnected, ShipperConfig::default()).is_none());

        let connected = Handler {
            connected: true,
            backend: Some(backend),
        };
        assert!(IndexShipper::from_handler(&connected, ShipperConfig::default()).is_some());

        let no_backend = Handler {
            connected: true,
            backend: None,
        };
        assert!(IndexShipper::from_handler(&no_backend, ShipperConfig::default()).is_none());
    }
}

//! Background loop scheduler.
//!
//! Each loop runs concurrently with at most one invocation in flight: a
//! tick that arrives while the previous one is still running is skipped.
//! Tick bodies run in their own task so a panic is contained to that tick;
//! the loop itself carries on. Shutdown is cooperative with a per-loop
//! deadline.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub type LoopFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type LoopFn = Arc<dyn Fn() -> LoopFuture + Send + Sync>;

struct LoopHandle {
    name: String,
    handle: JoinHandle<()>,
    in_flight: Arc<AtomicBool>,
}

pub struct BrainstemScheduler {
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<LoopHandle>>,
}

impl Default for BrainstemScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl BrainstemScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Register and start a periodic loop. The first tick fires after one
    /// period (plus a small name-derived jitter so loops don't align).
    pub fn spawn_loop(&self, name: &str, period: Duration, work: LoopFn) {
        let mut rx = self.shutdown_tx.subscribe();
        let in_flight = Arc::new(AtomicBool::new(false));
        let loop_flight = in_flight.clone();
        let loop_name = name.to_string();
        let effective = period + jitter_for(name, period);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(effective) => {}
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if loop_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    tracing::debug!(name = %loop_name, "previous tick still running, skipping");
                    continue;
                }

                let tick_flight = loop_flight.clone();
                let tick_name = loop_name.clone();
                let fut = work();
                tokio::spawn(async move {
                    // A panicking tick must not take the loop (or peers) down.
                    if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                        tracing::error!(name = %tick_name, "background tick panicked");
                    }
                    tick_flight.store(false, Ordering::SeqCst);
                });
            }
            tracing::debug!(name = %loop_name, "background loop stopped");
        });

        self.loops.lock().push(LoopHandle {
            name: name.to_string(),
            handle,
            in_flight,
        });
    }

    /// Names of registered loops.
    pub fn loop_names(&self) -> Vec<String> {
        self.loops.lock().iter().map(|l| l.name.clone()).collect()
    }

    /// Signal shutdown and wait up to `deadline` per loop for the loop task
    /// and its in-flight tick to finish. Stragglers are logged and left to
    /// the runtime.
    pub async fn stop(&self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);

        let loops = {
            let mut guard = self.loops.lock();
            std::mem::take(&mut *guard)
        };

        for entry in loops {
            if tokio::time::timeout(deadline, entry.handle).await.is_err() {
                tracing::warn!(name = %entry.name, "loop did not stop within deadline");
            }
            let waited = tokio::time::timeout(deadline, async {
                while entry.in_flight.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            if waited.is_err() {
                tracing::warn!(name = %entry.name, "in-flight tick did not finish within deadline");
            }
        }
    }
}

/// Deterministic per-loop jitter in `[0, period / 10]`.
fn jitter_for(name: &str, period: Duration) -> Duration {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    let bucket = period.as_millis() as u64 / 10;
    if bucket == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(hasher.finish() % bucket)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

//! Periodic and on-demand rate refresh.
//!
//! At most one fetch is in flight. Callers that ask for a refresh while one
//! is running await the same outcome instead of issuing a second request.
//! The fetch runs in its own task, so it finishes even if every caller goes
//! away or the scheduler is stopped.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use journalfx_common::{is_stale, now, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::{FxError, FxResult};
use crate::events::{EngineEvent, EventBus};
use crate::provider::RateSource;
use crate::registry::CurrencyRegistry;

/// Freshness of the rate table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatus {
    /// Completion time of the last successful refresh.
    pub last_updated: Option<Timestamp>,
    /// A fetch is currently outstanding.
    pub is_updating: bool,
    /// Reason the most recent refresh failed, cleared on success.
    pub last_error: Option<String>,
}

impl RefreshStatus {
    /// No successful refresh within `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        is_stale(self.last_updated, max_age)
    }
}

/// What a successful refresh changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Entries whose rate or change value moved.
    pub updated: usize,
    /// Table version after the refresh.
    pub version: u64,
    pub completed_at: Timestamp,
}

type SharedRefresh = Shared<BoxFuture<'static, FxResult<RefreshOutcome>>>;

struct RefresherInner {
    source: Arc<dyn RateSource>,
    registry: Arc<CurrencyRegistry>,
    events: EventBus,
    status: RwLock<RefreshStatus>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

/// Clears the in-flight slot when a fetch task ends, even by panic.
struct InFlightGuard<'a>(&'a RefresherInner);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.status.write().is_updating = false;
        self.0.in_flight.lock().take();
    }
}

impl RefresherInner {
    /// Join the in-flight refresh or start a new one.
    fn begin(self: &Arc<Self>) -> SharedRefresh {
        let mut slot = self.in_flight.lock();
        if let Some(pending) = slot.as_ref() {
            debug!("Coalescing refresh into in-flight fetch");
            return pending.clone();
        }

        self.status.write().is_updating = true;

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.run().await });
        let shared = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(FxError::RefreshFailed(format!("refresh task ended: {e}"))),
            }
        }
        .boxed()
        .shared();

        *slot = Some(shared.clone());
        shared
    }

    #[instrument(skip(self), name = "rate_refresh")]
    async fn run(self: Arc<Self>) -> FxResult<RefreshOutcome> {
        let _guard = InFlightGuard(&self);
        let base = self.registry.snapshot().base().clone();

        let fetched = self
            .source
            .fetch_rates()
            .await
            .and_then(|snapshot| snapshot.rebase(&base));

        match fetched {
            Ok(snapshot) => {
                let updated = self.registry.apply_snapshot(&snapshot);
                let completed_at = now();
                {
                    let mut status = self.status.write();
                    status.last_updated = Some(completed_at);
                    status.last_error = None;
                }
                let version = self.registry.version();

                info!(
                    source = self.source.name(),
                    received = snapshot.rates.len(),
                    updated,
                    version,
                    "Rate refresh completed"
                );
                Ok(RefreshOutcome {
                    updated,
                    version,
                    completed_at,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(source = self.source.name(), error = %reason, "Rate refresh failed; keeping previous rates");
                self.status.write().last_error = Some(reason.clone());
                self.events.publish(EngineEvent::RefreshFailed {
                    reason: reason.clone(),
                });
                Err(FxError::RefreshFailed(reason))
            }
        }
    }
}

struct Scheduler {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// The only writer of fetched rates into the registry.
pub struct RateRefresher {
    inner: Arc<RefresherInner>,
    interval: Duration,
    scheduler: Mutex<Option<Scheduler>>,
}

impl RateRefresher {
    pub fn new(
        source: Arc<dyn RateSource>,
        registry: Arc<CurrencyRegistry>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                source,
                registry,
                events,
                status: RwLock::new(RefreshStatus::default()),
                in_flight: Mutex::new(None),
            }),
            interval,
            scheduler: Mutex::new(None),
        }
    }

    pub fn status(&self) -> RefreshStatus {
        self.inner.status.read().clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch fresh rates, or wait for the fetch already in flight.
    ///
    /// On failure the previous rates stay in place and the error is
    /// [`FxError::RefreshFailed`].
    pub async fn refresh(&self) -> FxResult<RefreshOutcome> {
        self.inner.begin().await
    }

    /// Start the periodic refresh. The first tick fires immediately.
    ///
    /// Must be called from within a tokio runtime. Returns `false` if the
    /// scheduler is already running.
    pub fn start(&self) -> bool {
        let mut slot = self.scheduler.lock();
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Outcome is logged by the fetch task itself.
                        drop(inner.begin());
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("Rate refresh scheduler stopped");
        });

        info!(interval_secs = period.as_secs_f64(), "Rate refresh scheduler started");
        *slot = Some(Scheduler {
            shutdown_tx,
            handle,
        });
        true
    }

    /// Stop the periodic refresh. An in-flight fetch still completes.
    ///
    /// Returns `false` if the scheduler was not running.
    pub fn stop(&self) -> bool {
        let Some(scheduler) = self.scheduler.lock().take() else {
            return false;
        };
        let _ = scheduler.shutdown_tx.try_send(());
        true
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }
}

impl Drop for RateRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Payment Status Poller
//!
//! Owns at most one polling loop at a time. Each loop:
//! - waits one interval, then fetches the payment status
//! - hands every successful result to the caller's callback
//! - logs and skips failed fetches, retrying on the next tick
//! - ends itself once a completed or failed status has been delivered
//!
//! Every `start_tracking` bumps an epoch. A result is delivered only if the
//! epoch it was fetched under is still current, so a fetch that was in flight
//! when its session was stopped or replaced can never reach the callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::payments::service::PaymentService;
use crate::payments::types::PaymentRequest;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A status observed by a polling session
#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub epoch: u64,
    pub payment_id: String,
    pub payment: PaymentRequest,
}

pub type StatusCallback = Arc<dyn Fn(PollUpdate) + Send + Sync>;

/// One live polling loop. Dropping it stops the loop.
struct TrackingSession {
    payment_id: String,
    epoch: u64,
    session_id: Uuid,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TrackingSession {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct StatusPoller {
    service: Arc<dyn PaymentService>,
    interval: Duration,
    callback: StatusCallback,
    epoch: Arc<AtomicU64>,
    session: Option<TrackingSession>,
}

impl StatusPoller {
    /// A zero `interval` falls back to [`DEFAULT_POLL_INTERVAL`].
    pub fn new(
        service: Arc<dyn PaymentService>,
        interval: Duration,
        callback: impl Fn(PollUpdate) + Send + Sync + 'static,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                default_secs = DEFAULT_POLL_INTERVAL.as_secs(),
                "Zero poll interval requested, using default"
            );
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        Self {
            service,
            interval,
            callback: Arc::new(callback),
            epoch: Arc::new(AtomicU64::new(0)),
            session: None,
        }
    }

    /// Start polling `payment_id`, tearing down any session already running.
    ///
    /// Returns the epoch of the new session. Must be called from within a
    /// tokio runtime.
    pub fn start_tracking(&mut self, payment_id: &str) -> Result<u64, TrackerError> {
        if payment_id.is_empty() {
            return Err(TrackerError::EmptyPaymentId);
        }

        self.stop_tracking();

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = Uuid::new_v4();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poll_loop = PollLoop {
            service: Arc::clone(&self.service),
            callback: Arc::clone(&self.callback),
            current_epoch: Arc::clone(&self.epoch),
            epoch,
            payment_id: payment_id.to_string(),
            interval: self.interval,
        };

        let span = tracing::info_span!(
            "status_poller",
            payment_id = %payment_id,
            session_id = %session_id,
            epoch = epoch
        );
        let handle = tokio::spawn(poll_loop.run(shutdown_rx).instrument(span));

        info!(
            payment_id = %payment_id,
            session_id = %session_id,
            epoch = epoch,
            interval_secs = self.interval.as_secs(),
            "Started payment status tracking"
        );

        self.session = Some(TrackingSession {
            payment_id: payment_id.to_string(),
            epoch,
            session_id,
            shutdown_tx,
            handle,
        });

        Ok(epoch)
    }

    /// Stop the active session, if any. Returns whether one was stopped.
    ///
    /// Idempotent. A fetch already in flight still completes, but its result
    /// is discarded.
    pub fn stop_tracking(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        // Invalidate before signalling so an in-flight result is dropped.
        self.epoch.fetch_add(1, Ordering::SeqCst);

        debug!(
            payment_id = %session.payment_id,
            session_id = %session.session_id,
            epoch = session.epoch,
            "Stopped payment status tracking"
        );
        drop(session);
        true
    }

    /// Whether a polling loop is still scheduling ticks
    pub fn is_tracking(&self) -> bool {
        self.session.as_ref().is_some_and(TrackingSession::is_running)
    }

    /// Number of polling loops this poller currently owns (0 or 1)
    pub fn live_sessions(&self) -> usize {
        usize::from(self.is_tracking())
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Whether results tagged with `epoch` may still be applied
    pub fn is_current(&self, epoch: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.epoch == epoch) && self.current_epoch() == epoch
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.payment_id.as_str())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

struct PollLoop {
    service: Arc<dyn PaymentService>,
    callback: StatusCallback,
    current_epoch: Arc<AtomicU64>,
    epoch: u64,
    payment_id: String,
    interval: Duration,
}

impl PollLoop {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        // Fetches are awaited inline: a slow response delays the next tick
        // instead of overlapping with it.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    debug!("Shutdown signal received, stopping poll loop");
                    break;
                }
                _ = ticker.tick() => {
                    if self.poll_once().await {
                        break;
                    }
                }
            }
        }

        debug!("Poll loop exited");
    }

    /// One tick. Returns true when the loop should end.
    async fn poll_once(&self) -> bool {
        let response = match self.service.fetch_status(&self.payment_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Status poll failed, will retry on next tick");
                return false;
            }
        };

        if self.current_epoch.load(Ordering::SeqCst) != self.epoch {
            debug!(
                status = %response.data.payment.status,
                "Discarding status from superseded session"
            );
            return true;
        }

        let payment = response.data.payment;
        let status = payment.status;
        debug!(status = %status, "Polled payment status");

        (self.callback)(PollUpdate {
            epoch: self.epoch,
            payment_id: self.payment_id.clone(),
            payment,
        });

        if status.stops_polling() {
            info!(status = %status, "Terminal status observed, stopping poll loop");
            return true;
        }
        false
    }
}

//! Payment Lifecycle Controller
//!
//! Single source of truth for one payment's displayed state. Mediates
//! between the status poller, the payment service and the embedding view:
//!
//! ```text
//! Loading ──initial fetch──► Tracking ──poll: completed──► Completed
//!    │                          │ ──poll: failed─────► Failed
//!    │                          │ ──poll: refunded───► Refunded
//!    │                          │ ──cancel ok────────► Failed
//!    └──► Completed / Failed / Refunded (already terminal on mount)
//! ```
//!
//! Any failed request records an error message beside the phase, which the
//! view reports as `Error` until it is dismissed or the next action starts.
//! Network errors are never returned to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{TrackerConfig, DEFAULT_CANCEL_REASON};
use crate::error::TrackerError;
use crate::log_payment_event;
use crate::payments::service::PaymentService;
use crate::payments::types::{PaymentRequest, PaymentStatus};
use crate::workers::status_poller::{PollUpdate, StatusPoller, DEFAULT_POLL_INTERVAL};

const FETCH_FALLBACK_MESSAGE: &str = "Failed to fetch payment status";
const RETRY_FALLBACK_MESSAGE: &str = "Failed to retry payment";
const CANCEL_FALLBACK_MESSAGE: &str = "Failed to cancel payment";

// ============================================================================
// Events
// ============================================================================

/// Notifications delivered to the embedding view
pub trait PaymentEvents: Send + Sync {
    fn on_payment_complete(&self, payment: &PaymentRequest);

    fn on_payment_failed(&self, payment: &PaymentRequest);

    /// Fired after a successful retry request, before any poll confirms the
    /// new status.
    fn on_retry(&self);

    fn on_status_change(&self, _payment: &PaymentRequest) {}
}

/// Event sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl PaymentEvents for NoopEvents {
    fn on_payment_complete(&self, _payment: &PaymentRequest) {}
    fn on_payment_failed(&self, _payment: &PaymentRequest) {}
    fn on_retry(&self) {}
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Loading,
    Tracking,
    Completed,
    Failed,
    Refunded,
    Error,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Loading => "loading",
            LifecycleState::Tracking => "tracking",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
            LifecycleState::Refunded => "refunded",
            LifecycleState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Completed | LifecycleState::Failed | LifecycleState::Refunded
        )
    }

    fn for_status(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => LifecycleState::Tracking,
            PaymentStatus::Completed => LifecycleState::Completed,
            PaymentStatus::Failed => LifecycleState::Failed,
            PaymentStatus::Refunded => LifecycleState::Refunded,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the view renders. Time-dependent values are computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub state: LifecycleState,
    /// Lifecycle phase underneath a displayed error
    pub phase: LifecycleState,
    pub payment: Option<PaymentRequest>,
    pub error: Option<String>,
    pub busy: bool,
}

impl ControllerSnapshot {
    fn loading() -> Self {
        Self {
            state: LifecycleState::Loading,
            phase: LifecycleState::Loading,
            payment: None,
            error: None,
            busy: false,
        }
    }

    fn is_pending(&self) -> bool {
        self.payment
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Pending)
    }

    /// Minutes until expiry; only present while the payment is pending
    pub fn time_remaining_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.payment
            .as_ref()
            .filter(|p| p.status == PaymentStatus::Pending)
            .map(|p| p.time_remaining_minutes(now))
    }

    pub fn can_retry(&self) -> bool {
        self.is_pending() && !self.busy && self.payment.as_ref().is_some_and(|p| p.can_retry)
    }

    pub fn can_cancel(&self) -> bool {
        self.is_pending() && !self.busy
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub poll_interval: Duration,
    pub cancel_reason: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_reason: DEFAULT_CANCEL_REASON.to_string(),
        }
    }
}

impl From<&TrackerConfig> for LifecycleConfig {
    fn from(cfg: &TrackerConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            cancel_reason: cfg.cancel_reason.clone(),
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct PaymentLifecycleController {
    service: Arc<dyn PaymentService>,
    events: Arc<dyn PaymentEvents>,
    poller: StatusPoller,
    updates_rx: mpsc::UnboundedReceiver<PollUpdate>,
    cancel_reason: String,
    payment_id: Option<String>,
    /// Never `Error`; errors live in `error`
    phase: LifecycleState,
    payment: Option<PaymentRequest>,
    error: Option<String>,
    busy: bool,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
}

impl PaymentLifecycleController {
    pub fn new(
        service: Arc<dyn PaymentService>,
        events: Arc<dyn PaymentEvents>,
        config: LifecycleConfig,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::new(Arc::clone(&service), config.poll_interval, move |update| {
            // The receiver lives as long as the controller; a send can only
            // fail during teardown.
            let _ = updates_tx.send(update);
        });
        let (snapshot_tx, _) = watch::channel(ControllerSnapshot::loading());

        Self {
            service,
            events,
            poller,
            updates_rx,
            cancel_reason: config.cancel_reason,
            payment_id: None,
            phase: LifecycleState::Loading,
            payment: None,
            error: None,
            busy: false,
            snapshot_tx,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> LifecycleState {
        if self.error.is_some() {
            LifecycleState::Error
        } else {
            self.phase
        }
    }

    pub fn phase(&self) -> LifecycleState {
        self.phase
    }

    pub fn payment(&self) -> Option<&PaymentRequest> {
        self.payment.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_tracking(&self) -> bool {
        self.poller.is_tracking()
    }

    /// Polling loops owned by this controller (always 0 or 1)
    pub fn live_timers(&self) -> usize {
        self.poller.live_sessions()
    }

    /// Epoch of the most recent tracking session
    pub fn tracking_epoch(&self) -> u64 {
        self.poller.current_epoch()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state(),
            phase: self.phase,
            payment: self.payment.clone(),
            error: self.error.clone(),
            busy: self.busy,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn time_remaining_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.snapshot().time_remaining_minutes(now)
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Initial status fetch. Starts the poller if the payment is pending,
    /// otherwise fires the matching terminal callback straight away.
    #[instrument(skip(self))]
    pub async fn mount(&mut self, payment_id: &str) -> Result<(), TrackerError> {
        if payment_id.is_empty() {
            warn!("Refusing to mount with empty payment id");
            return Err(TrackerError::EmptyPaymentId);
        }

        self.poller.stop_tracking();
        self.payment_id = Some(payment_id.to_string());
        self.phase = LifecycleState::Loading;
        self.payment = None;
        self.error = None;
        self.busy = true;
        self.publish();

        let result = self.service.fetch_status(payment_id).await;
        self.busy = false;

        match result {
            Ok(response) => {
                let payment = response.data.payment;
                info!(status = %payment.status, "Initial payment status fetched");
                self.apply_payment(payment);
            }
            Err(e) => {
                warn!(error = %e, not_found = e.is_not_found(), "Initial status fetch failed");
                self.error = Some(e.user_message(FETCH_FALLBACK_MESSAGE));
                self.publish();
            }
        }

        Ok(())
    }

    /// Apply a result delivered by the poller. Returns whether it was applied.
    pub fn apply_poll_update(&mut self, update: PollUpdate) -> bool {
        if !self.poller.is_current(update.epoch) {
            debug!(
                epoch = update.epoch,
                current_epoch = self.poller.current_epoch(),
                status = %update.payment.status,
                "Discarding stale poll result"
            );
            return false;
        }

        let other_payment = self.payment_id.as_deref() != Some(update.payment_id.as_str());
        if self.phase.is_terminal() || other_payment {
            debug!(
                phase = %self.phase,
                status = %update.payment.status,
                "Ignoring poll result for settled payment"
            );
            return false;
        }

        self.apply_payment(update.payment);
        true
    }

    /// Wait for the next poll result and apply it.
    pub async fn process_next_update(&mut self) -> Option<bool> {
        let update = self.updates_rx.recv().await?;
        Some(self.apply_poll_update(update))
    }

    #[instrument(skip(self), fields(payment_id = ?self.payment_id))]
    pub async fn handle_retry(&mut self) -> Result<(), TrackerError> {
        let payment_id = self.ensure_actionable()?;

        if let Some(payment) = &self.payment {
            if !payment.can_retry {
                // The flag may be stale; let the service decide.
                debug!(
                    retries = %payment.retries_label(),
                    "Retry requested while canRetry is false"
                );
            }
        }

        self.error = None;
        self.busy = true;
        self.publish();

        let result = self.service.retry_payment(&payment_id).await;
        self.busy = false;

        match result {
            Ok(payment) => {
                info!(
                    status = %payment.status,
                    retries = %payment.retries_label(),
                    "Payment retry accepted"
                );
                // Fresh session: polls fetched before the retry are now stale.
                if payment.status == PaymentStatus::Pending {
                    if let Err(e) = self.poller.start_tracking(&payment_id) {
                        warn!(error = %e, "Could not restart status tracking");
                    }
                }
                self.apply_payment(payment);
                self.events.on_retry();
            }
            Err(e) => {
                warn!(error = %e, "Payment retry failed");
                self.error = Some(e.user_message(RETRY_FALLBACK_MESSAGE));
                self.publish();
            }
        }

        Ok(())
    }

    /// Cancel the payment. A successful cancel always ends in `Failed`,
    /// whatever status the service reports.
    #[instrument(skip(self), fields(payment_id = ?self.payment_id))]
    pub async fn handle_cancel(&mut self) -> Result<(), TrackerError> {
        let payment_id = self.ensure_actionable()?;

        self.error = None;
        self.busy = true;
        self.publish();

        let result = self
            .service
            .cancel_payment(&payment_id, &self.cancel_reason)
            .await;
        self.busy = false;

        match result {
            Ok(payment) => {
                info!(reported_status = %payment.status, "Payment cancelled");
                self.poller.stop_tracking();
                self.transition(LifecycleState::Failed);
                self.payment = Some(payment);
                self.publish();

                if let Some(payment) = &self.payment {
                    self.events.on_status_change(payment);
                    self.events.on_payment_failed(payment);
                }
            }
            Err(e) => {
                warn!(error = %e, "Payment cancel failed");
                self.error = Some(e.user_message(CANCEL_FALLBACK_MESSAGE));
                self.publish();
            }
        }

        Ok(())
    }

    pub fn dismiss_error(&mut self) {
        if self.error.take().is_some() {
            self.publish();
        }
    }

    /// Teardown. Stops any polling; late poll results are discarded.
    pub fn unmount(&mut self) -> bool {
        let stopped = self.poller.stop_tracking();
        if stopped {
            debug!(payment_id = ?self.payment_id, "Controller unmounted while tracking");
        }
        stopped
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_actionable(&self) -> Result<String, TrackerError> {
        let payment_id = self.payment_id.clone().ok_or(TrackerError::NotMounted)?;
        let payment = self.payment.as_ref().ok_or(TrackerError::NotMounted)?;

        if self.busy {
            return Err(TrackerError::Busy { payment_id });
        }
        if payment.status != PaymentStatus::Pending || self.phase.is_terminal() {
            return Err(TrackerError::NotPending {
                payment_id,
                status: payment.status.to_string(),
            });
        }
        Ok(payment_id)
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.phase != next {
            log_payment_event!(
                payment_id = self.payment_id.as_deref().unwrap_or_default(),
                from = self.phase,
                to = next,
            );
            self.phase = next;
        }
    }

    /// Fold a payment snapshot from the service into local state.
    fn apply_payment(&mut self, payment: PaymentRequest) {
        if self.phase.is_terminal() {
            return;
        }

        let status = payment.status;
        let next = LifecycleState::for_status(status);

        if status.is_terminal() {
            self.poller.stop_tracking();
        } else if !self.poller.is_tracking() {
            if let Some(payment_id) = self.payment_id.clone() {
                if let Err(e) = self.poller.start_tracking(&payment_id) {
                    warn!(error = %e, "Could not start status tracking");
                }
            }
        }

        self.transition(next);
        self.payment = Some(payment);
        self.publish();

        let Some(payment) = &self.payment else {
            return;
        };
        self.events.on_status_change(payment);
        match status {
            PaymentStatus::Completed => self.events.on_payment_complete(payment),
            PaymentStatus::Failed => self.events.on_payment_failed(payment),
            PaymentStatus::Pending | PaymentStatus::Refunded => {}
        }
    }

    // ------------------------------------------------------------------
    // Task-driven mode
    // ------------------------------------------------------------------

    /// Run the controller on its own task. All state is touched only from
    /// that task; the view talks to it through the returned handle.
    pub fn spawn(self, payment_id: impl Into<String>) -> LifecycleHandle {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let snapshots = self.subscribe();
        let task = tokio::spawn(self.run(payment_id.into(), commands_rx));

        LifecycleHandle {
            commands: commands_tx,
            snapshots,
            task,
        }
    }

    async fn run(mut self, payment_id: String, mut commands: mpsc::Receiver<LifecycleCommand>) {
        if let Err(e) = self.mount(&payment_id).await {
            warn!(error = %e, "Lifecycle controller failed to mount");
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(LifecycleCommand::Retry(reply)) => {
                        let _ = reply.send(self.handle_retry().await);
                    }
                    Some(LifecycleCommand::Cancel(reply)) => {
                        let _ = reply.send(self.handle_cancel().await);
                    }
                    Some(LifecycleCommand::DismissError) => self.dismiss_error(),
                    Some(LifecycleCommand::Unmount) | None => break,
                },
                Some(update) = self.updates_rx.recv() => {
                    self.apply_poll_update(update);
                }
            }
        }

        self.unmount();
        debug!(payment_id = %payment_id, "Lifecycle controller task stopped");
    }
}

impl Drop for PaymentLifecycleController {
    fn drop(&mut self) {
        self.poller.stop_tracking();
    }
}

// ============================================================================
// Handle
// ============================================================================

enum LifecycleCommand {
    Retry(oneshot::Sender<Result<(), TrackerError>>),
    Cancel(oneshot::Sender<Result<(), TrackerError>>),
    DismissError,
    Unmount,
}

/// View-side handle to a spawned controller. Dropping it unmounts.
pub struct LifecycleHandle {
    commands: mpsc::Sender<LifecycleCommand>,
    snapshots: watch::Receiver<ControllerSnapshot>,
    task: JoinHandle<()>,
}

impl LifecycleHandle {
    pub async fn retry(&self) -> Result<(), TrackerError> {
        self.request(LifecycleCommand::Retry).await
    }

    pub async fn cancel(&self) -> Result<(), TrackerError> {
        self.request(LifecycleCommand::Cancel).await
    }

    pub async fn dismiss_error(&self) -> Result<(), TrackerError> {
        self.commands
            .send(LifecycleCommand::DismissError)
            .await
            .map_err(|_| TrackerError::ControllerClosed)
    }

    /// Stop the controller and wait for its task to finish.
    pub async fn unmount(self) {
        let _ = self.commands.send(LifecycleCommand::Unmount).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Lifecycle controller task ended abnormally");
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot::clone(&self.snapshots.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the payment settles or an error is shown.
    pub async fn settled(&mut self) -> Result<ControllerSnapshot, TrackerError> {
        let snapshot = self
            .snapshots
            .wait_for(|s| s.state.is_terminal() || s.error.is_some())
            .await
            .map_err(|_| TrackerError::ControllerClosed)?;
        Ok(ControllerSnapshot::clone(&snapshot))
    }

    async fn request(
        &self,
        command: fn(oneshot::Sender<Result<(), TrackerError>>) -> LifecycleCommand,
    ) -> Result<(), TrackerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| TrackerError::ControllerClosed)?;
        reply_rx.await.map_err(|_| TrackerError::ControllerClosed)?
    }
}

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use payment_tracker::logging::init_tracing;
use payment_tracker::{
    HttpPaymentService, LifecycleConfig, LifecycleState, PaymentEvents,
    PaymentLifecycleController, PaymentRequest, TrackerConfig,
};
use tracing::{error, info, warn};

/// Writes lifecycle events to the log
struct LoggingEvents;

impl PaymentEvents for LoggingEvents {
    fn on_payment_complete(&self, payment: &PaymentRequest) {
        info!(payment_id = %payment.id, "Payment completed");
    }

    fn on_payment_failed(&self, payment: &PaymentRequest) {
        warn!(
            payment_id = %payment.id,
            reported_status = %payment.status,
            reason = payment.failure_reason.as_deref().unwrap_or("unknown"),
            "Payment failed"
        );
    }

    fn on_retry(&self) {
        info!("Payment retry submitted");
    }

    fn on_status_change(&self, payment: &PaymentRequest) {
        info!(
            payment_id = %payment.id,
            status = %payment.status,
            retries = %payment.retries_label(),
            minutes_remaining = payment.time_remaining_minutes(chrono::Utc::now()),
            "Payment status"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    init_tracing();

    let payment_id = std::env::args()
        .nth(1)
        .context("usage: payment-tracker <payment-id>")?;

    let config = TrackerConfig::load().context("failed to load tracker configuration")?;
    info!(
        base_url = %config.base_url,
        poll_interval_secs = config.poll_interval_secs,
        "Starting payment tracker"
    );

    let service = Arc::new(HttpPaymentService::from_config(&config));
    let controller = PaymentLifecycleController::new(
        service,
        Arc::new(LoggingEvents),
        LifecycleConfig::from(&config),
    );
    let mut handle = controller.spawn(payment_id);

    let outcome = tokio::select! {
        settled = handle.settled() => settled.ok(),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping tracker");
            None
        }
    };
    handle.unmount().await;

    let Some(snapshot) = outcome else {
        return Ok(ExitCode::FAILURE);
    };

    match snapshot.state {
        LifecycleState::Completed => Ok(ExitCode::SUCCESS),
        LifecycleState::Error => {
            error!(
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Payment tracking stopped on error"
            );
            Ok(ExitCode::FAILURE)
        }
        state => {
            warn!(state = %state, "Payment did not complete");
            Ok(ExitCode::FAILURE)
        }
    }
}

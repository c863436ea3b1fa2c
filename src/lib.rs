//! Client-side payment reconciliation for the hospital billing dashboard.
//!
//! After a payment is created, [`PaymentLifecycleController`] fetches its
//! status once, then keeps it up to date through a [`StatusPoller`] until the
//! payment completes, fails or the user cancels it.

pub mod config;
pub mod error;
pub mod logging;
pub mod payments;
pub mod services;
pub mod workers;

pub use config::TrackerConfig;
pub use error::{ServiceError, TrackerError};
pub use payments::{HttpPaymentService, PaymentRequest, PaymentService, PaymentStatus};
pub use services::{
    ControllerSnapshot, LifecycleConfig, LifecycleHandle, LifecycleState, NoopEvents,
    PaymentEvents, PaymentLifecycleController,
};
pub use workers::{PollUpdate, StatusPoller};

//! Services module for payment lifecycle logic

pub mod payment_lifecycle;

pub use payment_lifecycle::{
    ControllerSnapshot, LifecycleConfig, LifecycleHandle, LifecycleState, NoopEvents,
    PaymentEvents, PaymentLifecycleController,
};

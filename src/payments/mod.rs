//! Payment types and the payment service collaborator

pub mod http;
pub mod service;
pub mod types;

pub use http::HttpPaymentService;
pub use service::PaymentService;
pub use types::{PaymentRequest, PaymentStatus};

//! Payment service collaborator
//!
//! The tracker never processes payments itself; it only reads status and
//! asks the service to retry or cancel.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::payments::types::{PaymentRequest, StatusResponse};

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// `GET /payments/{id}/status`
    async fn fetch_status(&self, payment_id: &str) -> Result<StatusResponse, ServiceError>;

    /// `POST /payments/{id}/retry`
    async fn retry_payment(&self, payment_id: &str) -> Result<PaymentRequest, ServiceError>;

    /// `POST /payments/{id}/cancel`
    async fn cancel_payment(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> Result<PaymentRequest, ServiceError>;
}

//! Shared fakes for the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payment_tracker::payments::types::{StatusData, StatusInfo, StatusResponse};
use payment_tracker::{PaymentEvents, PaymentRequest, PaymentService, PaymentStatus, ServiceError};
use tokio::time::Instant;

pub fn payment(id: &str, status: PaymentStatus) -> PaymentRequest {
    payment_expiring_at(id, status, Utc::now() + chrono::Duration::minutes(10))
}

pub fn payment_expiring_at(
    id: &str,
    status: PaymentStatus,
    expiration_time: DateTime<Utc>,
) -> PaymentRequest {
    PaymentRequest {
        id: id.to_string(),
        status,
        expiration_time,
        retry_count: 0,
        max_retries: 3,
        can_retry: true,
        amount: Some(250.0),
        currency: Some("USD".to_string()),
        description: Some("Lab panel invoice".to_string()),
        failure_reason: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn status_error(status: u16, message: &str) -> ServiceError {
    ServiceError::Status {
        status,
        message: message.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FetchCall {
    pub payment_id: String,
    pub at: Instant,
}

/// Payment service that answers from a script.
///
/// Status responses are consumed in order; the last one repeats forever.
#[derive(Default)]
pub struct ScriptedService {
    statuses: Mutex<VecDeque<Result<PaymentRequest, ServiceError>>>,
    retry_response: Mutex<Option<Result<PaymentRequest, ServiceError>>>,
    cancel_response: Mutex<Option<Result<PaymentRequest, ServiceError>>>,
    fetch_delay: Mutex<Duration>,
    fetch_calls: Mutex<Vec<FetchCall>>,
    retry_calls: AtomicUsize,
    cancel_reasons: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new(statuses: Vec<Result<PaymentRequest, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            ..Self::default()
        })
    }

    pub fn with_fetch_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.fetch_delay.lock().unwrap() = delay;
        self
    }

    pub fn set_retry_response(&self, response: Result<PaymentRequest, ServiceError>) {
        *self.retry_response.lock().unwrap() = Some(response);
    }

    pub fn set_cancel_response(&self, response: Result<PaymentRequest, ServiceError>) {
        *self.cancel_response.lock().unwrap() = Some(response);
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.lock().unwrap().len()
    }

    pub fn retry_count(&self) -> usize {
        self.retry_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_reasons(&self) -> Vec<String> {
        self.cancel_reasons.lock().unwrap().clone()
    }

    fn next_status(&self) -> Result<PaymentRequest, ServiceError> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses
                .front()
                .cloned()
                .unwrap_or_else(|| Err(status_error(404, "Payment not found")))
        }
    }
}

#[async_trait]
impl PaymentService for ScriptedService {
    async fn fetch_status(&self, payment_id: &str) -> Result<StatusResponse, ServiceError> {
        self.fetch_calls.lock().unwrap().push(FetchCall {
            payment_id: payment_id.to_string(),
            at: Instant::now(),
        });

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let payment = self.next_status()?;
        Ok(StatusResponse {
            data: StatusData {
                status_info: StatusInfo {
                    status: payment.status,
                },
                payment,
            },
        })
    }

    async fn retry_payment(&self, _payment_id: &str) -> Result<PaymentRequest, ServiceError> {
        self.retry_calls.fetch_add(1, Ordering::SeqCst);
        self.retry_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(status_error(500, "")))
    }

    async fn cancel_payment(
        &self,
        _payment_id: &str,
        reason: &str,
    ) -> Result<PaymentRequest, ServiceError> {
        self.cancel_reasons.lock().unwrap().push(reason.to_string());
        self.cancel_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(status_error(500, "")))
    }
}

/// Records every event the controller emits
#[derive(Default)]
pub struct RecordingEvents {
    pub completed: Mutex<Vec<PaymentRequest>>,
    pub failed: Mutex<Vec<PaymentRequest>>,
    pub retries: AtomicUsize,
    pub status_changes: Mutex<Vec<PaymentStatus>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completed(&self) -> Vec<PaymentRequest> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failed(&self) -> Vec<PaymentRequest> {
        self.failed.lock().unwrap().clone()
    }

    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn status_changes(&self) -> Vec<PaymentStatus> {
        self.status_changes.lock().unwrap().clone()
    }
}

impl PaymentEvents for RecordingEvents {
    fn on_payment_complete(&self, payment: &PaymentRequest) {
        self.completed.lock().unwrap().push(payment.clone());
    }

    fn on_payment_failed(&self, payment: &PaymentRequest) {
        self.failed.lock().unwrap().push(payment.clone());
    }

    fn on_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_status_change(&self, payment: &PaymentRequest) {
        self.status_changes.lock().unwrap().push(payment.status);
    }
}

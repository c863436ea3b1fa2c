//! Payment request model shared by the poller and the lifecycle controller
//!
//! Field names follow the payment service's JSON (camelCase). The service is
//! authoritative for every field here; the client mirrors, never enforces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a payment request as reported by the payment service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Completed, failed and refunded payments never change again client-side.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Statuses after which the poller stops on its own.
    ///
    /// Refunded is only reached through an explicit cancel, so it is left to
    /// the controller.
    pub fn stops_polling(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tracked payment entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: String,
    pub status: PaymentStatus,
    /// Only meaningful while the payment is pending
    pub expiration_time: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub max_retries: u32,
    /// Computed by the service
    #[serde(default)]
    pub can_retry: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    /// Whole minutes left before the payment expires, floored at zero
    pub fn time_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        time_remaining_minutes(self.expiration_time, now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expiration_time <= now
    }

    /// "retryCount/maxRetries" as shown next to the retry button
    pub fn retries_label(&self) -> String {
        format!("{}/{}", self.retry_count, self.max_retries)
    }
}

/// `max(0, floor((expiration - now) / 60000))` in minutes
pub fn time_remaining_minutes(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiration - now).num_milliseconds();
    millis.div_euclid(60_000).max(0)
}

// ============================================================================
// Response envelopes
// ============================================================================

/// `GET /payments/{id}/status`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub data: StatusData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub payment: PaymentRequest,
    pub status_info: StatusInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusInfo {
    pub status: PaymentStatus,
}

/// `POST /payments/{id}/retry`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryResponse {
    pub data: RetryData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryData {
    pub payment: PaymentRequest,
}

/// `POST /payments/{id}/cancel`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CancelResponse {
    pub data: PaymentRequest,
}

/// Body of the cancel request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CancelRequest {
    pub reason: String,
}

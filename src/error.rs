//! Error types for the payment tracker
//!
//! `ServiceError` covers everything the external payment service can do
//! wrong. `TrackerError` is returned only when an action is rejected before
//! any request is made; network failures never surface as `TrackerError`,
//! they are folded into controller state instead.

/// Failure talking to the payment service
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Non-2xx response. 401 and 404 land here as well. `message` is empty
    /// when the body carried no usable error text.
    #[error("{}", status_text(.status, .message))]
    Status { status: u16, message: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

impl ServiceError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// Message shown in the error panel: the service's own error text, or
    /// `fallback` for anything else.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ServiceError::Status { message, .. } if !message.trim().is_empty() => {
                message.trim().to_string()
            }
            _ => fallback.to_string(),
        }
    }
}

fn status_text(status: &u16, message: &str) -> String {
    if message.trim().is_empty() {
        format!("request failed with status {}", status)
    } else {
        message.to_string()
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Action rejected by the poller or lifecycle controller
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("payment id must not be empty")]
    EmptyPaymentId,

    #[error("no payment is loaded")]
    NotMounted,

    #[error("payment {payment_id} is {status}, action requires pending")]
    NotPending { payment_id: String, status: String },

    #[error("a request for payment {payment_id} is already in flight")]
    Busy { payment_id: String },

    #[error("lifecycle controller has stopped")]
    ControllerClosed,
}

/// Invalid configuration values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_falls_back_when_empty() {
        let err = ServiceError::Status {
            status: 500,
            message: "  ".to_string(),
        };
        assert_eq!(err.user_message("Failed to retry payment"), "Failed to retry payment");

        let err = ServiceError::Status {
            status: 400,
            message: "Retry limit reached".to_string(),
        };
        assert_eq!(err.user_message("Failed to retry payment"), "Retry limit reached");
    }

    #[test]
    fn test_transport_errors_use_fallback() {
        let err = ServiceError::Transport("connection refused".into());
        assert_eq!(err.user_message("Failed to cancel payment"), "Failed to cancel payment");
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn test_empty_status_message_display() {
        let err = ServiceError::Status {
            status: 502,
            message: String::new(),
        };
        assert_eq!(err.to_string(), "request failed with status 502");
        assert_eq!(
            err.user_message("Failed to fetch payment status"),
            "Failed to fetch payment status"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = ServiceError::Status {
            status: 404,
            message: "Payment not found".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!ServiceError::Transport("connection refused".into()).is_not_found());
    }
}

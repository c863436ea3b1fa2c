//! reqwest-backed payment service client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use crate::config::TrackerConfig;
use crate::error::ServiceError;
use crate::logging::redact_sensitive_data;
use crate::payments::service::PaymentService;
use crate::payments::types::{
    CancelRequest, CancelResponse, PaymentRequest, RetryResponse, StatusResponse,
};

#[derive(Debug, Clone)]
pub struct HttpPaymentService {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpPaymentService {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.base_url.clone(), config.auth_token.clone())
    }

    /// `{base_url}/payments/{id}/{action}`, with the id escaped as a single
    /// path segment.
    fn payment_url(&self, payment_id: &str, action: &str) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["payments", payment_id, action]);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

/// Turn a non-2xx response into a `ServiceError::Status`, pulling the message
/// from whichever error shape the service used.
async fn status_error(response: Response) -> ServiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    debug!(
        status = status,
        body = %redact_sensitive_data(&body),
        "Payment service returned error response"
    );

    ServiceError::Status {
        status,
        message: extract_error_message(&body).unwrap_or_default(),
    }
}

/// Accepts `{"message": ..}`, `{"error": ".."}` and `{"error": {"message": ..}}`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;

    let message = value
        .get("message")
        .and_then(JsonValue::as_str)
        .or_else(|| value.get("error").and_then(JsonValue::as_str))
        .or_else(|| {
            value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(JsonValue::as_str)
        })?;

    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[async_trait]
impl PaymentService for HttpPaymentService {
    #[instrument(skip(self))]
    async fn fetch_status(&self, payment_id: &str) -> Result<StatusResponse, ServiceError> {
        let url = self.payment_url(payment_id, "status")?;
        self.send(self.client.get(url)).await
    }

    #[instrument(skip(self))]
    async fn retry_payment(&self, payment_id: &str) -> Result<PaymentRequest, ServiceError> {
        let url = self.payment_url(payment_id, "retry")?;
        let response: RetryResponse = self.send(self.client.post(url)).await?;
        Ok(response.data.payment)
    }

    #[instrument(skip(self))]
    async fn cancel_payment(
        &self,
        payment_id: &str,
        reason: &str,
    ) -> Result<PaymentRequest, ServiceError> {
        let url = self.payment_url(payment_id, "cancel")?;
        let body = CancelRequest {
            reason: reason.to_string(),
        };
        let response: CancelResponse = self.send(self.client.post(url).json(&body)).await?;
        Ok(response.data)
    }
}

//! Logging and tracing configuration for the payment tracker
//!
//! Structured JSON output in production, human-readable output in
//! development. Response bodies are scrubbed of credentials before they are
//! logged.

use regex::Regex;
use std::env;
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment types for logging configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Detect environment from ENV variable
    pub fn from_env() -> Self {
        Self::parse(
            &env::var("ENVIRONMENT")
                .or_else(|_| env::var("ENV"))
                .unwrap_or_else(|_| "development".to_string()),
        )
    }

    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn default_log_level(&self) -> Level {
        match self {
            Self::Development => Level::DEBUG,
            Self::Staging => Level::INFO,
            Self::Production => Level::INFO,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Initialize the tracing subscriber with appropriate formatting
///
/// # Environment Variables
/// - `ENVIRONMENT` or `ENV`: "production", "staging", or "development"
/// - `RUST_LOG`: override the filter (e.g. "payment_tracker=trace")
/// - `LOG_FORMAT`: force "json" or "pretty"
pub fn init_tracing() {
    let environment = Environment::from_env();

    let use_json = env::var("LOG_FORMAT")
        .map(|f| f.to_lowercase() == "json")
        .unwrap_or_else(|_| environment.is_production());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "payment_tracker={},reqwest=warn,hyper=warn",
            environment.default_log_level()
        ))
    });

    if use_json {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_level(true)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).init();
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(pretty_layer).init();
    }

    tracing::info!(
        environment = ?environment,
        format = if use_json { "json" } else { "pretty" },
        "Tracing initialized"
    );
}

fn sensitive_patterns() -> &'static [(Regex, String)] {
    static PATTERNS: OnceLock<Vec<(Regex, String)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Matched case-insensitively; the key's original spelling is kept.
        let keys = [
            "token",
            "access_token",
            "accesstoken",
            "refresh_token",
            "refreshtoken",
            "secret",
            "password",
            "api_key",
            "apikey",
            "authorization",
            "card_number",
            "cardnumber",
            "cvv",
        ];

        keys.iter()
            .filter_map(|key| {
                Regex::new(&format!(r#"(?i)"({})"\s*:\s*"[^"]*""#, key))
                    .ok()
                    .map(|re| (re, r#""${1}": "[REDACTED]""#.to_string()))
            })
            .chain(
                Regex::new(r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*")
                    .ok()
                    .map(|re| (re, "Bearer [REDACTED]".to_string())),
            )
            .collect()
    })
}

/// Redact credentials from JSON-like text before it reaches the logs
pub fn redact_sensitive_data(text: &str) -> String {
    sensitive_patterns()
        .iter()
        .fold(text.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, replacement.as_str()).into_owned()
        })
}

/// Log a payment lifecycle event with consistent structure
#[macro_export]
macro_rules! log_payment_event {
    ($($key:tt = $value:expr),* $(,)?) => {
        tracing::info!(
            event_type = "payment_lifecycle",
            $($key = tracing::field::display(&$value)),*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("stage"), Environment::Staging);
        assert_eq!(Environment::parse("anything-else"), Environment::Development);
        assert!(Environment::parse("production").is_production());
    }

    #[test]
    fn test_default_log_levels() {
        assert_eq!(Environment::Development.default_log_level(), Level::DEBUG);
        assert_eq!(Environment::Production.default_log_level(), Level::INFO);
        assert_eq!(Environment::Staging.default_log_level(), Level::INFO);
    }

    #[test]
    fn test_redact_sensitive_data() {
        let data = r#"{"token": "eyJhbGciOi", "message": "Unauthorized", "retryCount": 2}"#;
        let redacted = redact_sensitive_data(data);
        assert!(redacted.contains("[REDACTED]"));
        assert!(!redacted.contains("eyJhbGciOi"));
        assert!(redacted.contains("Unauthorized"));
    }

    #[test]
    fn test_redact_keys_case_insensitive() {
        let data = r#"{"Authorization": "Basic dXNl", "Token": "abc123", "AccessToken": "t0k"}"#;
        let redacted = redact_sensitive_data(data);
        assert!(!redacted.contains("dXNl"));
        assert!(!redacted.contains("abc123"));
        assert!(!redacted.contains("t0k"));
        assert!(redacted.contains(r#""Authorization": "[REDACTED]""#));
        assert!(redacted.contains(r#""Token": "[REDACTED]""#));
    }

    #[test]
    fn test_redact_bearer_header() {
        let redacted = redact_sensitive_data("rejected Authorization: Bearer abc.def-ghi");
        assert!(!redacted.contains("abc.def-ghi"));
        assert!(redacted.contains("Bearer [REDACTED]"));
    }
}

//! # Error Types Module
//!
//! Structured errors for the transport and persistence layers. Transport errors are
//! classified by origin (timeout, reset, unreachable, protocol or API). A failed
//! health probe reconnects only on a timeout, while any poller failure reconnects.

use teloxide::RequestError;

/// Message fragments identifying timeout-class failures
const TIMEOUT_SIGNATURES: &[&str] = &[
    "etimedout",
    "esockettimedout",
    "timed out",
    "timeout",
];

/// Message fragments identifying dropped connections
const RESET_SIGNATURES: &[&str] = &[
    "econnreset",
    "econnaborted",
    "socket hang up",
    "connection reset",
    "connection closed",
    "broken pipe",
];

/// Message fragments identifying unreachable hosts or failed resolution
const UNREACHABLE_SIGNATURES: &[&str] = &[
    "enotfound",
    "econnrefused",
    "ehostunreach",
    "enetunreach",
    "dns error",
    "connection refused",
    "unreachable",
    "error trying to connect",
];

/// Message fragments identifying protocol-level corruption
const PROTOCOL_SIGNATURES: &[&str] = &["eproto", "einval", "efatal", "protocol error"];

/// Failure of a call to the messaging transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Request or socket timed out
    Timeout(String),
    /// Established connection was dropped
    ConnectionReset(String),
    /// Host or network could not be reached
    Unreachable(String),
    /// Malformed or unexpected wire data
    Protocol(String),
    /// The API answered with an error
    Api(String),
}

impl TransportError {
    /// Classify a raw error message against the network signature tables
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let matches = |table: &[&str]| table.iter().any(|sig| lowered.contains(sig));

        if matches(TIMEOUT_SIGNATURES) {
            TransportError::Timeout(message)
        } else if matches(RESET_SIGNATURES) {
            TransportError::ConnectionReset(message)
        } else if matches(UNREACHABLE_SIGNATURES) {
            TransportError::Unreachable(message)
        } else if matches(PROTOCOL_SIGNATURES) {
            TransportError::Protocol(message)
        } else {
            TransportError::Api(message)
        }
    }

    /// Whether this failure came from the network rather than the API
    pub fn is_network(&self) -> bool {
        !matches!(self, TransportError::Api(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            TransportError::ConnectionReset(msg) => write!(f, "Connection reset: {msg}"),
            TransportError::Unreachable(msg) => write!(f, "Host unreachable: {msg}"),
            TransportError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            TransportError::Api(msg) => write!(f, "API error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<RequestError> for TransportError {
    fn from(err: RequestError) -> Self {
        let message = err.to_string();
        match &err {
            RequestError::Network(source) if source.is_timeout() => {
                TransportError::Timeout(message)
            }
            RequestError::Network(source) if source.is_connect() => {
                TransportError::Unreachable(message)
            }
            RequestError::Network(_) | RequestError::Io(_) => {
                match TransportError::classify(message) {
                    // Every network-layer failure reconnects, even without a known signature
                    TransportError::Api(msg) => TransportError::ConnectionReset(msg),
                    classified => classified,
                }
            }
            RequestError::InvalidJson { .. } => TransportError::Protocol(message),
            _ => TransportError::Api(message),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else {
            TransportError::classify(err.to_string())
        }
    }
}

/// Errors raised by the bot's own stores and configuration
#[derive(Debug)]
pub enum BotError {
    /// Reading or writing a data file failed
    Persistence(String),
    /// A data file could not be parsed
    Data(String),
    /// Required configuration is missing or malformed
    Config(String),
}

impl BotError {
    pub fn is_persistence(&self) -> bool {
        matches!(self, BotError::Persistence(_))
    }
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            BotError::Data(msg) => write!(f, "Data error: {msg}"),
            BotError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for BotError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_signatures() {
        assert!(TransportError::classify("ESOCKETTIMEDOUT").is_timeout());
        assert!(TransportError::classify("connect ETIMEDOUT 149.154.167.220:443").is_timeout());
        assert!(TransportError::classify("operation timed out").is_timeout());
    }

    #[test]
    fn test_network_signatures_trigger_reconnect() {
        for message in [
            "read ECONNRESET",
            "socket hang up",
            "getaddrinfo ENOTFOUND api.telegram.org",
            "connect ECONNREFUSED",
            "EHOSTUNREACH",
            "ENETUNREACH",
            "EPROTO",
            "error sending request: dns error",
        ] {
            let classified = TransportError::classify(message);
            assert!(classified.is_network(), "{message} should be a network error");
        }
    }

    #[test]
    fn test_api_errors_are_not_network() {
        let classified = TransportError::classify("Bad Request: message text is empty");
        assert_eq!(
            classified,
            TransportError::Api("Bad Request: message text is empty".to_string())
        );
        assert!(!classified.is_network());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::Timeout("getMe".to_string());
        assert_eq!(format!("{err}"), "Timeout error: getMe");

        let err = BotError::Persistence("clinics.json: permission denied".to_string());
        assert_eq!(
            format!("{err}"),
            "Persistence error: clinics.json: permission denied"
        );
        assert!(err.is_persistence());
    }
}

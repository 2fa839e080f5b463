//! Error types for the kadfs node
//!
//! This module defines the error types used across the DHT engine,
//! the content store and the RPC transport.

use std::fmt;

/// Comprehensive error type for kadfs operations
#[derive(Debug, Clone)]
pub enum KadfsError {
    /// Wire decoding / id parsing errors
    ParseError {
        message: String,
        source: Option<String>,
    },

    /// RPC errors against a specific peer (timeout, send failure)
    RpcError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Socket-level network errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// A value could not be found locally or on the network
    NotFound {
        key: String,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl KadfsError {
    /// Create a new ParseError
    pub fn parse_error(message: impl Into<String>) -> Self {
        KadfsError::ParseError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ParseError with source
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        KadfsError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new RpcError
    pub fn rpc_error(message: impl Into<String>) -> Self {
        KadfsError::RpcError {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new RpcError with peer address
    pub fn rpc_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        KadfsError::RpcError {
            message: message.into(),
            peer: Some(peer.into()),
            source: None,
        }
    }

    /// Create a new RpcError with peer and source
    pub fn rpc_error_full(
        message: impl Into<String>,
        peer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        KadfsError::RpcError {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new NetworkError
    pub fn network_error(message: impl Into<String>) -> Self {
        KadfsError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address
    pub fn network_error_with_address(
        message: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        KadfsError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        KadfsError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new NotFound error for a content key
    pub fn not_found(key: impl Into<String>) -> Self {
        KadfsError::NotFound { key: key.into() }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        KadfsError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        KadfsError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Whether this error means a peer was unreachable (timeout or send failure)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            KadfsError::RpcError { .. } | KadfsError::NetworkError { .. }
        )
    }
}

impl fmt::Display for KadfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KadfsError::ParseError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Parse error: {} (source: {})", message, src)
                } else {
                    write!(f, "Parse error: {}", message)
                }
            }
            KadfsError::RpcError { message, peer, source } => match (peer, source) {
                (Some(p), Some(s)) => {
                    write!(f, "RPC error: {} (peer: {}, source: {})", message, p, s)
                }
                (Some(p), None) => write!(f, "RPC error: {} (peer: {})", message, p),
                (None, Some(s)) => write!(f, "RPC error: {} (source: {})", message, s),
                (None, None) => write!(f, "RPC error: {}", message),
            },
            KadfsError::NetworkError { message, address, source } => match (address, source) {
                (Some(a), Some(s)) => {
                    write!(f, "Network error: {} (address: {}, source: {})", message, a, s)
                }
                (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                (None, None) => write!(f, "Network error: {}", message),
            },
            KadfsError::NotFound { key } => write!(f, "Not found: {}", key),
            KadfsError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for KadfsError {}

// Implement From traits for common error types

impl From<std::io::Error> for KadfsError {
    fn from(err: std::io::Error) -> Self {
        KadfsError::network_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for KadfsError {
    fn from(err: serde_json::Error) -> Self {
        KadfsError::parse_error_with_source("Failed to decode message", err.to_string())
    }
}

impl From<std::net::AddrParseError> for KadfsError {
    fn from(err: std::net::AddrParseError) -> Self {
        KadfsError::network_error_full("Failed to parse address", "unknown".to_string(), err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for KadfsError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        KadfsError::rpc_error("RPC timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error() {
        let err = KadfsError::parse_error("Invalid node id");
        assert_eq!(err.to_string(), "Parse error: Invalid node id");
    }

    #[test]
    fn test_parse_error_with_source() {
        let err = KadfsError::parse_error_with_source("Invalid node id", "odd hex length");
        assert!(err.to_string().contains("Parse error"));
        assert!(err.to_string().contains("Invalid node id"));
        assert!(err.to_string().contains("odd hex length"));
    }

    #[test]
    fn test_rpc_error_with_peer() {
        let err = KadfsError::rpc_error_with_peer("No response", "127.0.0.1:7400");
        assert!(err.to_string().contains("RPC error"));
        assert!(err.to_string().contains("No response"));
        assert!(err.to_string().contains("127.0.0.1:7400"));
    }

    #[test]
    fn test_not_found() {
        let err = KadfsError::not_found("abcd");
        assert_eq!(err.to_string(), "Not found: abcd");
    }

    #[test]
    fn test_config_error_with_field() {
        let err = KadfsError::config_error_with_field("Invalid value", "alpha");
        assert!(err.to_string().contains("Config error"));
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket closed");
        let err: KadfsError = io_err.into();
        assert!(matches!(err, KadfsError::NetworkError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: KadfsError = addr_err.into();
        assert!(matches!(err, KadfsError::NetworkError { .. }));
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(KadfsError::rpc_error("RPC timed out").is_unreachable());
        assert!(KadfsError::network_error("send failed").is_unreachable());
        assert!(!KadfsError::not_found("abcd").is_unreachable());
    }
}

//! Error type shared by the proxy and its backends

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    /// Malformed handle, or a request the current mode does not allow
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not available, e.g. no direct channel backend
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Out of memory")]
    NoMemory,

    /// A backend call returned a failure
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Events could not be written to the output channel
    #[error("Delivery failed, {dropped} events dropped")]
    DeliveryFailure { dropped: usize },

    /// A backend reported something outside its namespace, or bad setup
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sensormux_config::ConfigError> for HalError {
    fn from(err: sensormux_config::ConfigError) -> Self {
        HalError::ConfigurationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HalError::InvalidOperation("no direct channel".into());
        assert_eq!(err.to_string(), "Invalid operation: no direct channel");

        let err = HalError::DeliveryFailure { dropped: 7 };
        assert!(err.to_string().contains("7 events dropped"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: HalError = sensormux_config::ConfigError::Invalid("capacity".into()).into();
        assert!(matches!(err, HalError::ConfigurationError(msg) if msg.contains("capacity")));
    }
}

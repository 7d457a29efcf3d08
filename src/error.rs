// Error types for the routing script generator

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad config: {0}")]
    Schema(String),

    #[error("Bad network config: {0}")]
    Validation(String),

    #[error("Failed to execute command: {0}")]
    CommandExecution(String),

    #[error("Failed to query host: {0}")]
    HostQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Advanced routing is disabled")]
    Disabled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::Schema(_) => {
                "Routing intent is malformed. Every record needs a 'type' of table, route or rule.".to_string()
            }
            AppError::Validation(msg) => {
                format!("Routing intent was rejected: {}", msg)
            }
            AppError::CommandExecution(_) => {
                "Failed to apply a routing entry. Make sure iproute2 is installed and you are root.".to_string()
            }
            AppError::HostQuery(_) => {
                "Failed to inspect the host network state. Check that iproute2 is available.".to_string()
            }
            AppError::Config(_) => {
                "Configuration error. Check your config file or command-line arguments.".to_string()
            }
            AppError::Disabled => {
                "Advanced routing is disabled. Enable it in the config file to install routes.".to_string()
            }
            AppError::Io(_) => {
                "File system error. Check permissions on the script and table directories.".to_string()
            }
            AppError::Serialization(_) => {
                "Routing intent is not valid JSON.".to_string()
            }
        }
    }

    /// Live-system errors that teardown may log and move past
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::CommandExecution(_) | AppError::HostQuery(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_recoverable() {
        assert!(AppError::CommandExecution("ip rule del".to_string()).is_recoverable());
        assert!(AppError::HostQuery("ip rule".to_string()).is_recoverable());
        assert!(!AppError::Validation("metric".to_string()).is_recoverable());
        assert!(!AppError::Schema("type".to_string()).is_recoverable());
    }

    #[test]
    fn test_display_prefixes() {
        let err = AppError::Validation("table SF2 reference not defined".to_string());
        assert_eq!(err.to_string(), "Bad network config: table SF2 reference not defined");
        assert!(err.user_message().contains("SF2"));
    }
}

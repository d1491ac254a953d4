use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from file or environment: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid analysis configuration: {0}")]
    ValidationError(String),

    #[error("Failed to initialise logging: {0}")]
    LoggingError(String),
}

use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Error types for the dispatch layer
#[derive(Error, Debug)]
pub enum DispatchError {
    /// AMQP connection errors
    #[error("AMQP connection error: {0}")]
    Connection(#[from] lapin::Error),

    /// Message serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid Registrator construction, fatal to the caller
    #[error("Configuration error: {0}")]
    Config(String),

    /// Legacy envelope missing `command` or `data`
    #[error("Malformed request: missing '{0}'")]
    MalformedRequest(&'static str),

    /// Command not in the dispatch table, or the resolved handler failed
    #[error("Unable call method: {0}")]
    Resolution(String),

    /// A correlated reply could not be published
    #[error("Unable to reply to request: {0}")]
    ReplyDelivery(String),

    /// Handler errors
    #[error("Handler error: {0}")]
    Handler(String),

    /// Network I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispatchError {
    /// Create a new handler error
    pub fn handler_error<T: ToString>(message: T) -> Self {
        Self::Handler(message.to_string())
    }

    /// Create a new config error
    pub fn config_error<T: ToString>(message: T) -> Self {
        Self::Config(message.to_string())
    }

    /// True for the router-recoverable kinds that end as a structured
    /// reply to the client rather than an error in the consumption loop.
    pub fn is_routing_failure(&self) -> bool {
        matches!(self, Self::MalformedRequest(_) | Self::Resolution(_))
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Failed to write {kind} rows: {message}")]
    Sink { kind: &'static str, message: String },

    #[error("Relational store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Billing evaluation error: {0}")]
    Billing(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Task decoding error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TributaryError {
    /// Build a sink error for the given row kind.
    pub fn sink(kind: &'static str, message: impl Into<String>) -> Self {
        TributaryError::Sink {
            kind,
            message: message.into(),
        }
    }

    /// Permanent errors are never retried: the payload itself is wrong and
    /// re-running the operation cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TributaryError::Decode(_))
    }
}

impl From<serde_json::Error> for TributaryError {
    fn from(err: serde_json::Error) -> Self {
        TributaryError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TributaryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_decode_errors_are_permanent() {
        assert!(TributaryError::Decode("bad".into()).is_permanent());
        assert!(!TributaryError::sink("log", "timeout").is_permanent());
        assert!(!TributaryError::Cache("down".into()).is_permanent());
    }

    #[test]
    fn test_sink_error_display() {
        let err = TributaryError::sink("trace", "connection reset");
        assert_eq!(
            err.to_string(),
            "Failed to write trace rows: connection reset"
        );
    }
}

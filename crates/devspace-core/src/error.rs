//! Error types for devspace.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("push failed: {0}")]
    PushFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Prefix the message with context, keeping the variant.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::NotFound(m) => Error::NotFound(format!("{ctx}: {m}")),
            Error::InvalidInput(m) => Error::InvalidInput(format!("{ctx}: {m}")),
            Error::Client(m) => Error::Client(format!("{ctx}: {m}")),
            Error::BuildFailed(m) => Error::BuildFailed(format!("{ctx}: {m}")),
            Error::PushFailed(m) => Error::PushFailed(format!("{ctx}: {m}")),
            Error::Io(e) => Error::Internal(format!("{ctx}: {e}")),
            Error::Internal(m) => Error::Internal(format!("{ctx}: {m}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_variant() {
        let err = Error::Client("connection refused".to_string()).context("creating docker client");
        assert!(matches!(err, Error::Client(_)));
        assert_eq!(
            err.to_string(),
            "client error: creating docker client: connection refused"
        );
    }

    #[test]
    fn test_io_context_becomes_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = Error::from(io).context("reading Dockerfile");
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("reading Dockerfile"));
    }
}

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("[internal] {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    DomainPolicy(String),
}

/// Coarse classification of a [`RestoreError`], used by the scheduler to
/// decide whether a fresh attempt is worth starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Internal,
    Io,
    DomainPolicy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Internal => "internal",
            ErrorKind::Io => "io",
            ErrorKind::DomainPolicy => "domain_policy",
        };
        f.write_str(name)
    }
}

impl RestoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RestoreError::NotFound(_) => ErrorKind::NotFound,
            RestoreError::Invalid(_) => ErrorKind::Invalid,
            RestoreError::Internal(_) => ErrorKind::Internal,
            RestoreError::Io(_) => ErrorKind::Io,
            RestoreError::DomainPolicy(_) => ErrorKind::DomainPolicy,
        }
    }

    /// Only I/O failures leave nothing behind that a new attempt would trip over.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Prefixes the message with `context`, keeping the kind.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            RestoreError::NotFound(msg) => RestoreError::NotFound(format!("{}: {}", context, msg)),
            RestoreError::Invalid(msg) => RestoreError::Invalid(format!("{}: {}", context, msg)),
            RestoreError::Internal(msg) => RestoreError::Internal(format!("{}: {}", context, msg)),
            RestoreError::Io(msg) => RestoreError::Io(format!("{}: {}", context, msg)),
            RestoreError::DomainPolicy(msg) => {
                RestoreError::DomainPolicy(format!("{}: {}", context, msg))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;

impl From<std::io::Error> for RestoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RestoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}

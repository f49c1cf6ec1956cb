//! Error taxonomy shared by the sign and verify flows

use thiserror::Error;

/// Every collaborator failure is converted into one of these kinds
/// before it reaches a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    /// Bad local input; no remote call was attempted
    #[error("validation error: {0}")]
    Validation(String),

    /// The digest has no record in the registry
    #[error("document not registered: {0}")]
    NotFound(String),

    /// The registry already holds a record for this digest
    #[error("document already stored: {0}")]
    AlreadyExists(String),

    /// The key holder declined the signing request
    #[error("signature request rejected by user")]
    UserRejected,

    /// No connected session or no selected account
    #[error("no active wallet session")]
    NoActiveSession,

    /// Communication with the key holder or the RPC node failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The registry rejected the call
    #[error("registry error: {0}")]
    Remote(String),

    /// The source file could not be read
    #[error("io error: {0}")]
    Io(String),

    /// Malformed digest, signature or key material
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DocError {
    /// `AlreadyExists` means the artifact is durably recorded; callers
    /// should report it without alarm.
    pub fn is_benign(&self) -> bool {
        matches!(self, DocError::AlreadyExists(_))
    }

    /// Short machine-readable code, used by the CLI's JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            DocError::Validation(_) => "VALIDATION",
            DocError::NotFound(_) => "NOT_FOUND",
            DocError::AlreadyExists(_) => "ALREADY_EXISTS",
            DocError::UserRejected => "USER_REJECTED",
            DocError::NoActiveSession => "NO_ACTIVE_SESSION",
            DocError::Transport(_) => "TRANSPORT",
            DocError::Remote(_) => "REMOTE",
            DocError::Io(_) => "IO",
            DocError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

impl From<std::io::Error> for DocError {
    fn from(err: std::io::Error) -> Self {
        DocError::Io(err.to_string())
    }
}

/// Result type for docsig operations
pub type Result<T> = std::result::Result<T, DocError>;

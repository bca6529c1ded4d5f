use thiserror::Error;

/// The taxonomy from the error handling design: every fallible core operation
/// resolves to one of these. HTTP translation happens at the edge, not here.
#[derive(Debug, Clone, Error)]
pub enum HubError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("not enough proof for this write")]
    NotEnoughProof,

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("object does not exist: {0}")]
    DoesNotExist(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("conflicting name: {0}")]
    ConflictingName(String),
}

/// Sub-taxonomy for auth/scope failures. Callers outside logging should only
/// ever see the outer `HubError::Validation` with its `Display` message; this
/// distinction exists so the cause can be logged precisely (§4.2).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed token")]
    BadTokenFormat,
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("invalid association token chain")]
    AssociationInvalid,
    #[error("token expired")]
    Expired,
    #[error("token is not valid for this hub")]
    WrongHub,
    #[error("signing principal does not match request principal")]
    PrincipalMismatch,
    #[error("token has been revoked")]
    Revoked,
    #[error("principal is not on the writer whitelist")]
    NotWhitelisted,
    #[error("missing or malformed authorization header")]
    MissingAuthorization,
    #[error("request path is not authorized by any scope")]
    ScopeDenied,
    #[error("invalid principal")]
    InvalidPrincipal,
    #[error("invalid object path")]
    InvalidPath,
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    /// True for driver lookups that should be treated as "absent" rather than
    /// a hard failure (used when swallowing the first-write archival rename).
    pub fn is_does_not_exist(&self) -> bool {
        matches!(self, HubError::DoesNotExist(_))
    }
}

/// Marker wrapped in an `io::Error` by the upload pipeline's byte-counting
/// reader so a driver consuming that stream can tell "the ceiling was
/// exceeded mid-stream" apart from any other I/O failure (§4.5 step 8).
#[derive(Debug)]
pub struct PayloadTooLargeMarker;

impl std::fmt::Display for PayloadTooLargeMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("payload exceeded the effective upload limit")
    }
}

impl std::error::Error for PayloadTooLargeMarker {}

/// Classifies an `io::Error` produced while a driver copies/reads a
/// write-pipeline stream to completion: a wrapped `PayloadTooLargeMarker`
/// becomes `HubError::PayloadTooLarge`, anything else becomes
/// `HubError::Driver`.
pub fn classify_copy_error(e: std::io::Error) -> HubError {
    let is_overflow = e
        .get_ref()
        .map(|inner| inner.is::<PayloadTooLargeMarker>())
        .unwrap_or(false);
    if is_overflow {
        HubError::PayloadTooLarge(e.to_string())
    } else {
        HubError::Driver(e.to_string())
    }
}

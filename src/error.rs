use thiserror::Error;

/// Setup-time failures. Nothing is served when one of these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A path prefix does not start and end with `/`.
    #[error("path prefix '{0}' must start and end with '/'")]
    InvalidPrefix(String),

    #[error("invalid config file: {0}")]
    Parse(String),

    /// All validation issues found in one pass.
    #[error("config is not valid: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// A token whose expiry could not be established. Such a token is never cached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("invalid JWT format: expected 3 segments, got {0}")]
    Format(usize),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("invalid JWT payload: {0}")]
    Payload(String),

    #[error("JWT payload has no 'exp' claim")]
    MissingExpiry,

    #[error("JWT 'exp' claim is not a unix timestamp: {0}")]
    InvalidExpiry(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Every failure this crate reports. Apart from `InvalidInput` and `SessionFailed`, an error
/// leaves the session unusable: destroy it and, if appropriate, establish a new one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or missing key material at session creation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// MAC verification failed: tampering, key or prologue mismatch, or desynchronisation.
    #[error("authentication failure")]
    AuthenticationFailure,
    /// A primitive reported an error, or produced an unusable (non-contributory) output.
    #[error("cryptographic primitive failure")]
    CryptoFailure,
    /// The direction's message counter hit its reserved maximum.
    #[error("nonce exhausted")]
    NonceExhausted,
    /// The caller broke a size or ordering precondition. Nothing was mutated.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("session failed")]
    SessionFailed,
    /// The configured verifier refused the remote static key.
    #[error("remote static key rejected")]
    KeyRejected,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether this error terminates the session it was raised on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidInput(_) | Self::SessionFailed)
    }
}

use thiserror::Error;

/// Failures of the interactive OAuth login.
///
/// Cloneable because one in-flight login hands the same result to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("State mismatch in sign-in callback")]
    StateMismatch,

    #[error("No authorization code in sign-in callback")]
    MissingCode,

    #[error("Sign-in denied: {0}")]
    Denied(String),

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Sign-in window failed: {0}")]
    SignIn(String),

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    pub(crate) fn store(err: impl std::fmt::Display) -> Self {
        AuthError::Store(err.to_string())
    }
}

//! Authentication against the HH API.
//!
//! This module provides:
//! - `Credential` and the `TokenStore` implementations that persist it
//!   (OS keychain, session file, memory)
//! - OAuth2 authorization-code helpers and the `SignInLauncher` seam
//! - `LoginCoordinator`: single-flight interactive login
//!
//! Tokens carry no tracked expiry; the API answering 401/403 is what marks
//! a credential stale.

pub mod credentials;
pub mod error;
pub mod login;
pub mod oauth;

pub use credentials::{Credential, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};
pub use error::AuthError;
pub use login::LoginCoordinator;
pub use oauth::{OAuthEndpoints, SignInLauncher};

//! Core library for hhbridge.
//!
//! Bridges HH.ru résumés into Bitrix24: an HH API client with OAuth login
//! and credential refresh, a Bitrix24 webhook client, settings storage and
//! the dispatcher that routes UI messages to those calls.

pub mod api;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod utils;

pub use api::{ApiError, BitrixClient, HhClient};
pub use auth::{AuthError, Credential, SignInLauncher, TokenStore};
pub use config::{Config, ConfigOverrides, ConfigStore};
pub use dispatch::{Command, Dispatcher, Reply};

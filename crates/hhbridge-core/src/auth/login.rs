//! Single-flight interactive login.
//!
//! At most one login runs at a time. Callers that need a credential while a
//! login is in flight await that same login instead of opening another
//! sign-in window. The slot is emptied when the login settles, success or
//! failure, so the next caller starts a fresh attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::oauth::{exchange_code, parse_callback, AuthorizationRequest, OAuthEndpoints};
use super::{AuthError, Credential, SignInLauncher, TokenStore};
use crate::config::ConfigStore;

type LoginFuture = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

struct PendingLogin {
    generation: u64,
    future: LoginFuture,
}

struct Inner {
    http: Client,
    config: Arc<dyn ConfigStore>,
    tokens: Arc<dyn TokenStore>,
    launcher: Arc<dyn SignInLauncher>,
    endpoints: OAuthEndpoints,
    pending: Mutex<Option<PendingLogin>>,
    next_generation: AtomicU64,
}

/// Owner of the "current login" slot.
#[derive(Clone)]
pub struct LoginCoordinator {
    inner: Arc<Inner>,
}

impl LoginCoordinator {
    pub fn new(
        http: Client,
        config: Arc<dyn ConfigStore>,
        tokens: Arc<dyn TokenStore>,
        launcher: Arc<dyn SignInLauncher>,
        endpoints: OAuthEndpoints,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                tokens,
                launcher,
                endpoints,
                pending: Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Run the interactive login, or join the one already in flight.
    pub async fn login(&self) -> Result<Credential, AuthError> {
        let future = {
            let mut slot = self.inner.pending.lock().await;
            self.start_or_join(&mut slot)
        };
        future.await
    }

    /// The stored credential, or the result of a login if there is none.
    ///
    /// The store is read under the slot lock, so a login that settled after
    /// the caller last looked is not repeated.
    pub async fn credential(&self) -> Result<Credential, AuthError> {
        let future = {
            let mut slot = self.inner.pending.lock().await;
            if slot.is_none() {
                if let Some(credential) = self.inner.tokens.load().map_err(AuthError::store)? {
                    return Ok(credential);
                }
            }
            self.start_or_join(&mut slot)
        };
        future.await
    }

    fn start_or_join(&self, slot: &mut Option<PendingLogin>) -> LoginFuture {
        if let Some(pending) = slot.as_ref() {
            debug!(generation = pending.generation, "Joining in-flight login");
            return pending.future.clone();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let result = inner.run_login().await;
            inner.settle(generation).await;
            result
        }
        .boxed()
        .shared();
        *slot = Some(PendingLogin {
            generation,
            future: future.clone(),
        });
        future
    }

    /// Whether a login is currently in flight
    pub async fn is_pending(&self) -> bool {
        self.inner.pending.lock().await.is_some()
    }
}

impl Inner {
    async fn run_login(&self) -> Result<Credential, AuthError> {
        let config = self
            .config
            .get()
            .map_err(|e| AuthError::InvalidConfig(e.to_string()))?;
        if config.hh_client_id.is_empty() {
            return Err(AuthError::InvalidConfig("HH_CLIENT_ID is not set".to_string()));
        }

        let redirect_uri = self.launcher.redirect_uri();
        let request =
            AuthorizationRequest::new(&self.endpoints.authorize_url, &config.hh_client_id, &redirect_uri)?;

        info!("Starting interactive sign-in");
        let callback = self.launcher.launch(&request.url).await?;
        let code = parse_callback(&callback, &request.state).map_err(|e| {
            warn!(error = %e, "Rejected sign-in callback");
            e
        })?;

        let credential = exchange_code(
            &self.http,
            &self.endpoints.token_url,
            &code,
            &config.hh_client_id,
            &config.hh_client_secret,
            &redirect_uri,
        )
        .await?;

        self.tokens.save(&credential).map_err(AuthError::store)?;
        info!("Sign-in complete");
        Ok(credential)
    }

    /// Empty the slot if it still holds the login identified by `generation`.
    async fn settle(&self, generation: u64) {
        let mut slot = self.pending.lock().await;
        if slot.as_ref().map(|p| p.generation) == Some(generation) {
            *slot = None;
        }
    }
}

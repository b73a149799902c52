#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use hhbridge_core::auth::{
    AuthError, Credential, MemoryTokenStore, OAuthEndpoints, SignInLauncher, TokenStore,
};
use hhbridge_core::config::{Config, MemoryConfigStore};
use hhbridge_core::HhClient;

pub const REDIRECT_URI: &str = "http://127.0.0.1:8735/oauth";

#[derive(Clone, Copy)]
pub enum Callback {
    /// Completes the sign-in with code `code-1` and the expected state
    Approve,
    /// Returns a redirect carrying somebody else's state
    ForeignState,
    /// Returns a redirect without a code
    NoCode,
}

/// Sign-in window stand-in that records what it saw.
pub struct FakeSignIn {
    callback: Callback,
    delay: Duration,
    tokens: Arc<MemoryTokenStore>,
    launches: AtomicUsize,
    stored_at_launch: Mutex<Vec<Option<String>>>,
}

impl FakeSignIn {
    pub fn new(callback: Callback, tokens: Arc<MemoryTokenStore>) -> Self {
        Self {
            callback,
            delay: Duration::from_millis(50),
            tokens,
            launches: AtomicUsize::new(0),
            stored_at_launch: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Token that was in the store each time the window opened
    pub fn stored_at_launch(&self) -> Vec<Option<String>> {
        self.stored_at_launch.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignInLauncher for FakeSignIn {
    fn redirect_uri(&self) -> String {
        REDIRECT_URI.to_string()
    }

    async fn launch(&self, authorize_url: &Url) -> Result<String, AuthError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let stored = self.tokens.load().unwrap().map(|c| c.access_token);
        self.stored_at_launch.lock().unwrap().push(stored);

        tokio::time::sleep(self.delay).await;

        let state = authorize_url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        Ok(match self.callback {
            Callback::Approve => format!("{}?code=code-1&state={}", REDIRECT_URI, state),
            Callback::ForeignState => format!("{}?code=code-1&state=forged", REDIRECT_URI),
            Callback::NoCode => format!("{}?state={}", REDIRECT_URI, state),
        })
    }
}

pub fn test_config() -> Config {
    Config {
        hh_client_id: "client-1".to_string(),
        hh_client_secret: "secret-1".to_string(),
        hh_employer_id: "42".to_string(),
        ..Config::default()
    }
}

pub struct Harness {
    pub client: HhClient,
    pub tokens: Arc<MemoryTokenStore>,
    pub sign_in: Arc<FakeSignIn>,
    pub config: Arc<MemoryConfigStore>,
}

/// Client wired to `base_url` for API calls and OAuth endpoints.
pub fn harness(base_url: &str, callback: Callback, stored: Option<&str>) -> Harness {
    let tokens = Arc::new(match stored {
        Some(token) => MemoryTokenStore::with_credential(Credential::new(token)),
        None => MemoryTokenStore::new(),
    });
    let sign_in = Arc::new(FakeSignIn::new(callback, Arc::clone(&tokens)));
    let config = Arc::new(MemoryConfigStore::new(test_config()));

    let client = HhClient::builder()
        .base_url(base_url)
        .endpoints(OAuthEndpoints {
            authorize_url: format!("{}/oauth/authorize", base_url),
            token_url: format!("{}/token", base_url),
        })
        .build(config.clone(), tokens.clone(), sign_in.clone())
        .expect("client");

    Harness {
        client,
        tokens,
        sign_in,
        config,
    }
}

pub fn stored_token(tokens: &MemoryTokenStore) -> Option<String> {
    tokens.load().unwrap().map(|c| c.access_token)
}

//! Authenticated client for the HH API.
//!
//! Every request carries the current bearer credential. When no credential
//! is stored, an interactive login runs first (shared with any concurrent
//! caller). A 401/403 on the first attempt clears the stale credential,
//! logs in again and retries once; a 401/403 on the retry is returned as is.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::request::{RequestBody, ResponseMode};
use super::{ApiError, ApiResponse, OutboundRequest};
use crate::auth::{AuthError, Credential, LoginCoordinator, OAuthEndpoints, SignInLauncher, TokenStore};
use crate::config::ConfigStore;
use crate::utils::{encode_base64, extension_for_mime};

/// Base URL for HH API endpoints
pub const API_BASE_URL: &str = "https://api.hh.ru";

/// Product identification sent with every request
const USER_AGENT: &str = concat!("hhbridge/", env!("CARGO_PKG_VERSION"));

/// HH asks integrations to identify themselves in this header as well
const HH_USER_AGENT_HEADER: &str = "hh-user-agent";

/// HTTP request timeout in seconds. Does not apply to the sign-in window.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where a logical request is in its authorization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

/// Candidate photo, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Photo {
    pub base64: String,
    pub ext: Option<String>,
}

pub struct HhClientBuilder {
    base_url: String,
    endpoints: OAuthEndpoints,
    timeout: Duration,
}

impl Default for HhClientBuilder {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            endpoints: OAuthEndpoints::default(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl HhClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(
        self,
        config: Arc<dyn ConfigStore>,
        tokens: Arc<dyn TokenStore>,
        launcher: Arc<dyn SignInLauncher>,
    ) -> Result<HhClient, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HH_USER_AGENT_HEADER,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;

        let login = LoginCoordinator::new(
            http.clone(),
            config,
            Arc::clone(&tokens),
            launcher,
            self.endpoints,
        );

        Ok(HhClient {
            http,
            base_url: self.base_url,
            tokens,
            login,
        })
    }
}

/// HH API client.
/// Clone is cheap: the connection pool and the login slot are shared.
#[derive(Clone)]
pub struct HhClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    login: LoginCoordinator,
}

impl HhClient {
    pub fn builder() -> HhClientBuilder {
        HhClientBuilder::default()
    }

    /// Perform `request` with the current credential attached.
    pub async fn send(&self, request: &OutboundRequest) -> Result<ApiResponse, ApiError> {
        let mut credential = self.access_token().await?;
        let mut attempt = Attempt::First;

        loop {
            let response = self.dispatch(request, &credential).await?;
            let status = response.status();
            if status.is_success() {
                return ApiResponse::read(response).await;
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);

            match attempt {
                Attempt::First if error.is_authorization_failure() => {
                    warn!(%status, path = %request.target, "Credential rejected, signing in again");
                    credential = self.reauthenticate(&credential).await?;
                    attempt = Attempt::Retry;
                }
                _ => return Err(error),
            }
        }
    }

    /// Stored credential, or a fresh one from an interactive login.
    pub async fn access_token(&self) -> Result<Credential, AuthError> {
        match self.tokens.load().map_err(AuthError::store)? {
            Some(credential) => Ok(credential),
            None => self.login.credential().await,
        }
    }

    /// Run (or join) an interactive login.
    pub async fn login(&self) -> Result<Credential, AuthError> {
        self.login.login().await
    }

    /// Forget the stored credential.
    pub fn sign_out(&self) -> Result<(), ApiError> {
        self.tokens.clear().map_err(ApiError::store)
    }

    /// The stored credential, without signing in
    pub fn stored_credential(&self) -> Result<Option<Credential>, ApiError> {
        self.tokens.load().map_err(ApiError::store)
    }

    pub fn is_signed_in(&self) -> Result<bool, ApiError> {
        Ok(self.stored_credential()?.is_some())
    }

    async fn dispatch(
        &self,
        request: &OutboundRequest,
        credential: &Credential,
    ) -> Result<reqwest::Response, ApiError> {
        let url = request.url(&self.base_url);
        debug!(method = %request.method, url = %url, "HH request");

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(&credential.access_token);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if request.response_mode == ResponseMode::Binary {
            builder = builder.header(header::ACCEPT, "*/*");
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        Ok(builder.send().await?)
    }

    /// Replace a credential the API just rejected.
    ///
    /// The rejected credential is cleared before the new login starts. If
    /// another task already committed a different credential, that one is
    /// reused instead of signing in again.
    async fn reauthenticate(&self, stale: &Credential) -> Result<Credential, ApiError> {
        match self.tokens.load().map_err(ApiError::store)? {
            Some(current) if current.access_token != stale.access_token => {
                debug!("Newer credential already stored, reusing it");
                return Ok(current);
            }
            Some(_) => self.tokens.clear().map_err(ApiError::store)?,
            None => {}
        }
        Ok(self.login.login().await?)
    }

    // ===== HH Operations =====

    /// Full résumé by id
    pub async fn resume(&self, resume_id: &str) -> Result<Value, ApiError> {
        self.send(&OutboundRequest::get(format!("/resumes/{}", resume_id)))
            .await?
            .json()
    }

    /// Employer profile
    pub async fn employer(&self, employer_id: &str) -> Result<Value, ApiError> {
        self.send(&OutboundRequest::get(format!("/employers/{}", employer_id)))
            .await?
            .json()
    }

    /// The signed-in user
    pub async fn me(&self) -> Result<Value, ApiError> {
        self.send(&OutboundRequest::get("/me")).await?.json()
    }

    /// Download a file link handed out by the API (résumé PDF etc.)
    pub async fn download(&self, file_url: &str) -> Result<ApiResponse, ApiError> {
        self.send(&OutboundRequest::get(file_url).binary()).await
    }

    /// Candidate photo; `None` when the API has no photo for this link.
    pub async fn photo(&self, file_url: &str) -> Result<Option<Photo>, ApiError> {
        match self.download(file_url).await {
            Ok(response) => Ok(Some(Photo {
                ext: response.content_type().and_then(extension_for_mime),
                base64: encode_base64(response.bytes()),
            })),
            Err(ApiError::NotFound(_)) => {
                debug!(url = file_url, "No photo");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

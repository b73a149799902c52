//! OAuth2 authorization-code helpers for hh.ru.

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{AuthError, Credential};

/// Authorization endpoint (interactive sign-in page)
pub const AUTHORIZE_URL: &str = "https://hh.ru/oauth/authorize";

/// Token endpoint for the code exchange
pub const TOKEN_URL: &str = "https://api.hh.ru/token";

/// Length of the anti-replay `state` parameter
const STATE_LENGTH: usize = 32;

/// Where the login flow sends the user and exchanges the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

/// Opens an interactive sign-in surface and waits for it to finish.
///
/// Implementations must not time out on their own: a sign-in the user never
/// completes keeps the login pending.
#[async_trait]
pub trait SignInLauncher: Send + Sync {
    /// Redirect target registered for this instance.
    fn redirect_uri(&self) -> String;

    /// Show `authorize_url` to the user and return the final redirect URL.
    async fn launch(&self, authorize_url: &Url) -> Result<String, AuthError>;
}

/// Generate a fresh anti-replay token
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// A prepared authorization request and the state it must come back with.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
}

impl AuthorizationRequest {
    pub fn new(
        authorize_url: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Self, AuthError> {
        let state = generate_state();
        let mut url = Url::parse(authorize_url)
            .map_err(|e| AuthError::InvalidConfig(format!("authorize url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state);
        Ok(Self { url, state })
    }
}

/// Validate the sign-in redirect and pull the authorization code out of it.
pub fn parse_callback(redirect: &str, expected_state: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect)
        .map_err(|e| AuthError::SignIn(format!("invalid redirect url: {}", e)))?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if param("state").as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    if let Some(error) = param("error") {
        return Err(AuthError::Denied(error));
    }
    match param("code") {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(AuthError::MissingCode),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Exchange an authorization code for an access credential.
pub async fn exchange_code(
    http: &Client,
    token_url: &str,
    code: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
) -> Result<Credential, AuthError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", redirect_uri),
    ];

    let response = http
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(%status, "Token endpoint rejected the code");
        return Err(AuthError::ExchangeFailed(format!("status {}: {}", status, body)));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::ExchangeFailed(format!("invalid token response: {}", e)))?;

    match token.access_token {
        Some(access_token) if !access_token.is_empty() => {
            Ok(Credential::new(access_token).with_expires_in(token.expires_in))
        }
        _ => Err(AuthError::ExchangeFailed("no access_token in response".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_request_carries_parameters() {
        let request =
            AuthorizationRequest::new(AUTHORIZE_URL, "client-1", "http://127.0.0.1:8735/oauth")
                .unwrap();
        let pairs: Vec<(String, String)> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(request.url.host_str(), Some("hh.ru"));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("client_id".into(), "client-1".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://127.0.0.1:8735/oauth".into()
        )));
        assert!(pairs.contains(&("state".into(), request.state.clone())));
    }

    #[test]
    fn test_states_are_fresh() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), STATE_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_callback() {
        let ok = parse_callback("http://localhost/oauth?code=abc&state=s1", "s1");
        assert_eq!(ok, Ok("abc".to_string()));

        let mismatch = parse_callback("http://localhost/oauth?code=abc&state=other", "s1");
        assert_eq!(mismatch, Err(AuthError::StateMismatch));

        let no_state = parse_callback("http://localhost/oauth?code=abc", "s1");
        assert_eq!(no_state, Err(AuthError::StateMismatch));

        let no_code = parse_callback("http://localhost/oauth?state=s1", "s1");
        assert_eq!(no_code, Err(AuthError::MissingCode));

        let denied = parse_callback("http://localhost/oauth?error=access_denied&state=s1", "s1");
        assert_eq!(denied, Err(AuthError::Denied("access_denied".to_string())));
    }
}

//! Interactive sign-in through the system browser.
//!
//! The redirect URI points at a loopback address; this module listens there,
//! opens the authorization page and waits for the browser to come back.

use async_trait::async_trait;
use hhbridge_core::auth::{AuthError, SignInLauncher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

/// Largest request head read from the browser
const MAX_REQUEST_BYTES: usize = 16 * 1024;

const DONE_PAGE: &str = "<!doctype html><html><head><meta charset=\"utf-8\"><title>hhbridge</title></head>\
<body><p>Sign-in finished. You can close this tab.</p></body></html>";

/// Shows a URL to the user
pub type BrowserOpener = fn(&str) -> Result<(), String>;

fn system_browser(url: &str) -> Result<(), String> {
    opener::open(url).map_err(|e| e.to_string())
}

pub struct LoopbackSignIn {
    redirect: Url,
    open_browser: BrowserOpener,
}

impl LoopbackSignIn {
    pub fn new(redirect_uri: &str) -> Result<Self, AuthError> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| AuthError::InvalidConfig(format!("HH_REDIRECT_URI: {}", e)))?;
        if redirect.host_str().is_none() || redirect.port_or_known_default().is_none() {
            return Err(AuthError::InvalidConfig(
                "HH_REDIRECT_URI must include a host and port".to_string(),
            ));
        }
        Ok(Self {
            redirect,
            open_browser: system_browser,
        })
    }

    pub fn with_browser(mut self, open_browser: BrowserOpener) -> Self {
        self.open_browser = open_browser;
        self
    }

    fn bind_address(&self) -> (String, u16) {
        let host = self.redirect.host_str().unwrap_or("127.0.0.1").to_string();
        let port = self.redirect.port_or_known_default().unwrap_or(80);
        (host, port)
    }
}

/// Request target from an HTTP request head: `GET /oauth?code=x HTTP/1.1` -> `/oauth?code=x`
fn request_target(head: &str) -> Option<&str> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    if method != "GET" {
        return None;
    }
    parts.next()
}

async fn respond(stream: &mut tokio::net::TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Browser went away before the response");
    }
}

#[async_trait]
impl SignInLauncher for LoopbackSignIn {
    fn redirect_uri(&self) -> String {
        self.redirect.to_string()
    }

    async fn launch(&self, authorize_url: &Url) -> Result<String, AuthError> {
        let listener = TcpListener::bind(self.bind_address())
            .await
            .map_err(|e| AuthError::SignIn(format!("cannot listen on {}: {}", self.redirect, e)))?;

        info!("Opening browser for HH sign-in");
        if let Err(e) = (self.open_browser)(authorize_url.as_str()) {
            warn!(error = %e, "Could not open browser");
            eprintln!("Open this URL to sign in:\n{}", authorize_url);
        }

        loop {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| AuthError::SignIn(e.to_string()))?;

            let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
            let read = match stream.read(&mut buffer).await {
                Ok(read) => read,
                Err(e) => {
                    debug!(%peer, error = %e, "Unreadable callback connection");
                    continue;
                }
            };
            let head = String::from_utf8_lossy(&buffer[..read]);

            let Some(callback) = request_target(&head).and_then(|t| self.redirect.join(t).ok())
            else {
                respond(&mut stream, "400 Bad Request", "").await;
                continue;
            };
            if callback.path() != self.redirect.path() {
                // favicon and friends
                respond(&mut stream, "404 Not Found", "").await;
                continue;
            }

            respond(&mut stream, "200 OK", DONE_PAGE).await;
            return Ok(callback.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_target() {
        let head = "GET /oauth?code=abc&state=s HTTP/1.1\r\nHost: 127.0.0.1:8735\r\n\r\n";
        assert_eq!(request_target(head), Some("/oauth?code=abc&state=s"));
        assert_eq!(request_target("POST /oauth HTTP/1.1\r\n"), None);
        assert_eq!(request_target(""), None);
    }

    #[test]
    fn test_redirect_requires_host() {
        assert!(LoopbackSignIn::new("http://127.0.0.1:8735/oauth").is_ok());
        assert!(LoopbackSignIn::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_launch_returns_callback_url() {
        // Bind an ephemeral port to find a free one, then release it
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let redirect = format!("http://127.0.0.1:{}/oauth", port);
        let sign_in = LoopbackSignIn::new(&redirect)
            .unwrap()
            .with_browser(|_| Ok(()));

        let authorize = Url::parse("http://127.0.0.1:9/oauth/authorize").unwrap();
        let launch = tokio::spawn(async move { sign_in.launch(&authorize).await });

        let mut stream = loop {
            match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        stream
            .write_all(b"GET /oauth?code=c1&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let callback = launch.await.unwrap().unwrap();
        assert_eq!(
            callback,
            format!("http://127.0.0.1:{}/oauth?code=c1&state=s1", port)
        );
    }
}

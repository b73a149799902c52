use reqwest::Method;
use serde_json::Value;

/// How the caller intends to read the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// One logical API call.
///
/// Immutable once built; retry bookkeeping lives with the sender, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the API base, or an absolute URL
    pub target: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub response_mode: ResponseMode,
}

impl OutboundRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            response_mode: ResponseMode::Json,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }

    pub fn binary(mut self) -> Self {
        self.response_mode = ResponseMode::Binary;
        self
    }

    /// Resolve the target against `base_url`. Absolute targets (file links
    /// handed out by the API) are used as-is.
    pub fn url(&self, base_url: &str) -> String {
        if self.target.starts_with("http://") || self.target.starts_with("https://") {
            self.target.clone()
        } else {
            format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                self.target.trim_start_matches('/')
            )
        }
    }
}

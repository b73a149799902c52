use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;

use super::ApiError;
use crate::utils::mime_essence;

/// A successful response, fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, ApiError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(Self::new(status, content_type, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// MIME type without parameters, e.g. `image/jpeg`
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref().map(mime_essence)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    pub fn text(&self) -> Result<String, ApiError> {
        String::from_utf8(self.body.clone())
            .map_err(|e| ApiError::InvalidResponse(format!("Body is not UTF-8: {}", e)))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_strips_parameters() {
        let response = ApiResponse::new(
            StatusCode::OK,
            Some("application/json; charset=utf-8".to_string()),
            b"{\"id\":\"1\"}".to_vec(),
        );
        assert_eq!(response.content_type(), Some("application/json"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_json_reports_invalid_body() {
        let response = ApiResponse::new(StatusCode::OK, None, b"<html>".to_vec());
        assert!(matches!(
            response.json::<serde_json::Value>(),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}

//! Client for a Bitrix24 inbound webhook.
//!
//! The webhook URL already embeds its secret, so there is no auth layer.
//! The base URL is read from configuration on every call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiError, ApiResponse};
use crate::config::{Config, ConfigStore};

/// Bitrix list methods page by 50 records
pub const PAGE_SIZE: u32 = 50;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct BitrixClient {
    http: Client,
    config: Arc<dyn ConfigStore>,
}

impl BitrixClient {
    pub fn new(config: Arc<dyn ConfigStore>) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, config })
    }

    fn config(&self) -> Result<Config, ApiError> {
        self.config.get().map_err(ApiError::store)
    }

    /// Offset of the first record on `page`
    fn page_start(page: u32) -> Result<u32, ApiError> {
        page.checked_mul(PAGE_SIZE)
            .ok_or_else(|| ApiError::InvalidInput(format!("page {} is out of range", page)))
    }

    fn method_url(config: &Config, method: &str) -> Result<String, ApiError> {
        let base = config.b24_base_url.trim();
        if base.is_empty() {
            return Err(ApiError::NotConfigured("B24_BASE_URL"));
        }
        Ok(format!("{}/{}", base.trim_end_matches('/'), method))
    }

    async fn check(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        ApiResponse::read(response).await?.json()
    }

    /// POST one REST method with an optional JSON body
    pub async fn call(&self, method: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = Self::method_url(&self.config()?, method)?;
        debug!(method, "Bitrix call");

        let mut request = self.http.post(&url);
        if let Some(ref body) = body {
            request = request.json(body);
        }
        Self::check(request.send().await?).await
    }

    /// GET one REST method with query parameters
    pub async fn call_get(
        &self,
        method: &str,
        params: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let url = Self::method_url(&self.config()?, method)?;
        debug!(method, "Bitrix call");

        let response = self.http.get(&url).query(params).send().await?;
        Self::check(response).await
    }

    // ===== CRM Operations =====

    pub async fn contact_fields(&self) -> Result<Value, ApiError> {
        self.call("crm.contact.fields", None).await
    }

    /// Contact type dictionary
    pub async fn contact_types(&self) -> Result<Value, ApiError> {
        self.call(
            "crm.status.list",
            Some(json!({ "filter": { "ENTITY_ID": "CONTACT_TYPE" } })),
        )
        .await
    }

    /// Contacts whose field `key` equals `value`, with user fields
    pub async fn find_contacts(&self, key: &str, value: Value) -> Result<Value, ApiError> {
        let mut filter = serde_json::Map::new();
        filter.insert(key.to_string(), value);
        self.call(
            "crm.contact.list",
            Some(json!({ "filter": filter, "select": ["*", "UF_*"] })),
        )
        .await
    }

    pub async fn deal_fields(&self) -> Result<Value, ApiError> {
        self.call("crm.deal.fields", None).await
    }

    pub async fn list_deals(&self, filter: Value) -> Result<Value, ApiError> {
        self.call(
            "crm.deal.list",
            Some(json!({ "filter": filter, "select": ["UF_*"] })),
        )
        .await
    }

    pub async fn add_deal(&self, fields: Value) -> Result<Value, ApiError> {
        self.call("crm.deal.add", Some(json!({ "FIELDS": fields })))
            .await
    }

    pub async fn add_contact(&self, fields: Value) -> Result<Value, ApiError> {
        self.call("crm.contact.add", Some(json!({ "FIELDS": fields })))
            .await
    }

    /// One page of vacancies (smart-process items), optionally filtered by title
    pub async fn vacancies(&self, page: u32, query: Option<&str>) -> Result<Value, ApiError> {
        let start = Self::page_start(page)?;
        let config = self.config()?;
        let mut body = json!({
            "entityTypeId": config.b24_vacancies_entity_type_id,
            "select": ["id", "title"],
            "start": start,
        });
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            body["filter"] = json!({ "title": format!("%{}%", query) });
        }
        self.call("crm.item.list", Some(body)).await
    }

    /// One page of active recruiters from the configured department
    pub async fn recruiters(&self, page: u32, query: Option<&str>) -> Result<Value, ApiError> {
        let start = Self::page_start(page)?;
        let config = self.config()?;
        let mut params = vec![
            ("UF_DEPARTMENT".to_string(), config.b24_recruiters_department.clone()),
            ("start".to_string(), start.to_string()),
            ("SORT".to_string(), "NAME".to_string()),
            ("ORDER".to_string(), "ASC".to_string()),
            ("ACTIVE".to_string(), "true".to_string()),
        ];
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            params.push(("NAME_SEARCH".to_string(), format!("%{}%", query)));
        }
        self.call_get("user.get", &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let mut config = Config::default();
        assert!(matches!(
            BitrixClient::method_url(&config, "crm.deal.add"),
            Err(ApiError::NotConfigured("B24_BASE_URL"))
        ));

        config.b24_base_url = "https://crm.example.ru/rest/1/secret/".to_string();
        assert_eq!(
            BitrixClient::method_url(&config, "crm.deal.add").unwrap(),
            "https://crm.example.ru/rest/1/secret/crm.deal.add"
        );
    }

    #[test]
    fn test_page_start() {
        assert_eq!(BitrixClient::page_start(0).unwrap(), 0);
        assert_eq!(BitrixClient::page_start(3).unwrap(), 150);
        assert!(matches!(
            BitrixClient::page_start(100_000_000),
            Err(ApiError::InvalidInput(_))
        ));
    }
}

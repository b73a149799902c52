//! Routing of UI messages to outbound calls.
//!
//! A message is a JSON object tagged by `type`. Every message gets exactly
//! one `Reply`; a `type` no handler knows is answered with
//! `{ "ok": false, "error": "unknown_command" }`. An optional `id` on the
//! message is echoed back so replies can be matched when several are in
//! flight.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ApiError, BitrixClient, HhClient};
use crate::config::{ConfigOverrides, ConfigStore};
use crate::utils::{deal_link, encode_base64};

pub const UNKNOWN_COMMAND: &str = "unknown_command";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    HhGetPersonResume { resume_id: String },
    HhGetMyEmployerInfo,
    HhGetMe,
    #[serde(rename_all = "camelCase")]
    HhGetResumeFileByUrl { file_url: String },
    #[serde(rename_all = "camelCase")]
    HhGetPersonPhotoByUrl { file_url: String },
    HhLogout,
    BitrixGetContactFields,
    BitrixGetCrmStatusList,
    #[serde(rename_all = "camelCase")]
    BitrixGetContactByHhId {
        contact_id_key: String,
        contact_id_value: Value,
    },
    BitrixGetCrmDealFields,
    BitrixGetDealList {
        #[serde(default)]
        filter: Value,
    },
    BitrixAddDeal { fields: Value },
    BitrixAddContact { fields: Value },
    #[serde(rename_all = "camelCase")]
    BitrixGetDealLink { deal_id: String },
    BitrixGetVacancies {
        #[serde(default)]
        page: u32,
        #[serde(default)]
        query: Option<String>,
    },
    BitrixGetRecruiters {
        #[serde(default)]
        page: u32,
        #[serde(default)]
        query: Option<String>,
    },
    ConfigGet,
    ConfigSet { values: ConfigOverrides },
    ConfigReset,
}

impl Command {
    /// Every `type` tag a message may carry
    pub const TYPES: [&'static str; 19] = [
        "HH_GET_PERSON_RESUME",
        "HH_GET_MY_EMPLOYER_INFO",
        "HH_GET_ME",
        "HH_GET_RESUME_FILE_BY_URL",
        "HH_GET_PERSON_PHOTO_BY_URL",
        "HH_LOGOUT",
        "BITRIX_GET_CONTACT_FIELDS",
        "BITRIX_GET_CRM_STATUS_LIST",
        "BITRIX_GET_CONTACT_BY_HH_ID",
        "BITRIX_GET_CRM_DEAL_FIELDS",
        "BITRIX_GET_DEAL_LIST",
        "BITRIX_ADD_DEAL",
        "BITRIX_ADD_CONTACT",
        "BITRIX_GET_DEAL_LINK",
        "BITRIX_GET_VACANCIES",
        "BITRIX_GET_RECRUITERS",
        "CONFIG_GET",
        "CONFIG_SET",
        "CONFIG_RESET",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self {
            id: None,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            id: None,
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn unknown_command() -> Self {
        Self::failure(UNKNOWN_COMMAND)
    }

    fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    hh: HhClient,
    bitrix: BitrixClient,
    config: Arc<dyn ConfigStore>,
}

impl Dispatcher {
    pub fn new(hh: HhClient, bitrix: BitrixClient, config: Arc<dyn ConfigStore>) -> Self {
        Self { hh, bitrix, config }
    }

    /// Answer one raw message.
    pub async fn handle(&self, message: Value) -> Reply {
        let id = message.get("id").cloned();
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !Command::TYPES.contains(&kind.as_str()) {
            debug!(kind = %kind, "Unknown command");
            return Reply::unknown_command().with_id(id);
        }

        let command: Command = match serde_json::from_value(message) {
            Ok(command) => command,
            Err(e) => return Reply::failure(format!("invalid message: {}", e)).with_id(id),
        };

        match self.execute(command).await {
            Ok(data) => Reply::ok(data).with_id(id),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Command failed");
                Reply::failure(format!("{:#}", e)).with_id(id)
            }
        }
    }

    /// Run a parsed command and return the reply payload.
    pub async fn execute(&self, command: Command) -> Result<Value> {
        let data = match command {
            Command::HhGetPersonResume { resume_id } => self.hh.resume(&resume_id).await?,
            Command::HhGetMyEmployerInfo => {
                let employer_id = self.config.get()?.hh_employer_id;
                if employer_id.is_empty() {
                    return Err(ApiError::NotConfigured("HH_EMPLOYER_ID").into());
                }
                self.hh.employer(&employer_id).await?
            }
            Command::HhGetMe => self.hh.me().await?,
            Command::HhGetResumeFileByUrl { file_url } => {
                let file = self.hh.download(&file_url).await?;
                Value::String(encode_base64(file.bytes()))
            }
            Command::HhGetPersonPhotoByUrl { file_url } => {
                serde_json::to_value(self.hh.photo(&file_url).await?)?
            }
            Command::HhLogout => {
                self.hh.sign_out()?;
                Value::Null
            }
            Command::BitrixGetContactFields => self.bitrix.contact_fields().await?,
            Command::BitrixGetCrmStatusList => self.bitrix.contact_types().await?,
            Command::BitrixGetContactByHhId {
                contact_id_key,
                contact_id_value,
            } => {
                self.bitrix
                    .find_contacts(&contact_id_key, contact_id_value)
                    .await?
            }
            Command::BitrixGetCrmDealFields => self.bitrix.deal_fields().await?,
            Command::BitrixGetDealList { filter } => self.bitrix.list_deals(filter).await?,
            Command::BitrixAddDeal { fields } => self.bitrix.add_deal(fields).await?,
            Command::BitrixAddContact { fields } => self.bitrix.add_contact(fields).await?,
            Command::BitrixGetDealLink { deal_id } => {
                let base = self.config.get()?.b24_base_url;
                let link = deal_link(&base, &deal_id).context("B24_BASE_URL is not a valid URL")?;
                Value::String(link)
            }
            Command::BitrixGetVacancies { page, query } => {
                self.bitrix.vacancies(page, query.as_deref()).await?
            }
            Command::BitrixGetRecruiters { page, query } => {
                self.bitrix.recruiters(page, query.as_deref()).await?
            }
            Command::ConfigGet => serde_json::to_value(self.config.get()?)?,
            Command::ConfigSet { values } => {
                self.config.set(values)?;
                serde_json::to_value(self.config.get()?)?
            }
            Command::ConfigReset => {
                self.config.reset()?;
                serde_json::to_value(self.config.get()?)?
            }
        };
        Ok(data)
    }
}

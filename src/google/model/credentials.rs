//! Google OAuth 凭证数据模型
//!
//! - `ClientSecrets`: Google Cloud Console 下载的 `client_secrets.json`
//! - `StoredCredentials`: 令牌缓存 `mycreds.json`，授权/刷新后写回

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 令牌在到期前多久即视为过期
const EXPIRY_MARGIN_SECS: i64 = 300;

/// OAuth 客户端信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,

    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// `client_secrets.json` 外层结构，桌面应用为 `installed`，网页应用为 `web`
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ClientSecrets {
    pub fn from_json(json_string: &str) -> anyhow::Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json_string)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow::anyhow!("client secrets 缺少 installed 或 web 字段"))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("无法读取 {:?}: {}", path.as_ref(), e))?;
        Self::from_json(&content)
    }
}

/// 缓存的 OAuth 凭证
///
/// 字段与 oauth2client 的存储格式一致，未识别的字段原样保留
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// 过期时间 (UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// 刷新被拒绝后标记为失效
    #[serde(default)]
    pub invalid: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StoredCredentials {
    pub fn from_json(json_string: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_string)
    }

    /// 从文件加载凭证，文件不存在或为空时返回 None
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::from_json(&content)?))
    }

    /// 写回文件：先写临时文件再重命名，避免中断时留下半个 JSON
    ///
    /// 容器中以单文件挂载时无法重命名覆盖，此时直接写入
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_pretty_json()?;
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = fs::write(&tmp, &json).and_then(|_| fs::rename(&tmp, path)) {
            tracing::debug!("通过 {:?} 替换失败 ({})，直接写入", tmp, e);
            let _ = fs::remove_file(&tmp);
            fs::write(path, &json)?;
        }
        Ok(())
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 是否需要刷新
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.as_deref().unwrap_or_default().is_empty() {
            return true;
        }
        match self.token_expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => true,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// 目录列表页面地址
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// 列表文件名需要包含的关键字
    #[serde(default = "default_list_pattern")]
    pub list_pattern: String,

    /// Google Drive 上的文件标题
    #[serde(default = "default_drive_filename")]
    pub drive_filename: String,

    /// 下载时使用的临时文件
    #[serde(default = "default_tempfile_name")]
    pub tempfile_name: String,

    #[serde(default = "default_client_secrets_path")]
    pub client_secrets_path: String,

    /// OAuth 令牌缓存文件
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 本地授权回调服务器监听地址，容器内需要 0.0.0.0
    #[serde(default = "default_oauth_host")]
    pub oauth_host: String,

    /// 本地授权回调服务器可用端口，按顺序尝试
    #[serde(default = "default_oauth_ports")]
    pub oauth_ports: Vec<u16>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// HTTP 代理地址（可选）
    /// 支持格式: http://host:port, https://host:port, socks5://host:port
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// 代理认证用户名（可选）
    #[serde(default)]
    pub proxy_username: Option<String>,

    /// 代理认证密码（可选）
    #[serde(default)]
    pub proxy_password: Option<String>,
}

impl Config {
    /// 从环境变量覆盖配置
    pub fn override_from_env(&mut self) {
        if let Ok(url) = env::var("LISTING_URL") {
            self.listing_url = url;
        }
        if let Ok(pattern) = env::var("LIST_PATTERN") {
            self.list_pattern = pattern;
        }
        if let Ok(name) = env::var("DRIVE_FILENAME") {
            self.drive_filename = name;
        }
        if let Ok(name) = env::var("TEMPFILE_NAME") {
            self.tempfile_name = name;
        }
        if let Ok(path) = env::var("CLIENT_SECRETS") {
            self.client_secrets_path = path;
        }
        if let Ok(path) = env::var("CREDENTIALS_FILE") {
            self.credentials_path = path;
        }
        if let Ok(path) = env::var("LOG_FILE") {
            self.log_file = path;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(host) = env::var("OAUTH_HOST") {
            self.oauth_host = host;
        }
        if let Ok(ports) = env::var("OAUTH_PORTS") {
            let parsed = parse_ports(&ports);
            if !parsed.is_empty() {
                self.oauth_ports = parsed;
            }
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.request_timeout_secs = t;
            }
        }
        if let Ok(proxy) = env::var("PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Ok(username) = env::var("PROXY_USERNAME") {
            self.proxy_username = Some(username);
        }
        if let Ok(password) = env::var("PROXY_PASSWORD") {
            self.proxy_password = Some(password);
        }
    }

    /// 保证目录地址以 `/` 结尾，便于直接拼接文件名
    pub fn normalized_listing_url(&self) -> String {
        if self.listing_url.ends_with('/') {
            self.listing_url.clone()
        } else {
            format!("{}/", self.listing_url)
        }
    }
}

/// 解析逗号分隔的端口列表，忽略无法解析的项
fn parse_ports(raw: &str) -> Vec<u16> {
    raw.split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect()
}

fn default_listing_url() -> String {
    "http://ceruliz.nl/maarten/backup/".to_string()
}

fn default_list_pattern() -> String {
    "bowielist".to_string()
}

fn default_drive_filename() -> String {
    "bowielist".to_string()
}

fn default_tempfile_name() -> String {
    "tmpfile.xlsx".to_string()
}

fn default_client_secrets_path() -> String {
    "client_secrets.json".to_string()
}

fn default_credentials_path() -> String {
    "mycreds.json".to_string()
}

fn default_log_file() -> String {
    "bowielist.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_oauth_host() -> String {
    "127.0.0.1".to_string()
}

fn default_oauth_ports() -> Vec<u16> {
    vec![8080, 8090]
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            list_pattern: default_list_pattern(),
            drive_filename: default_drive_filename(),
            tempfile_name: default_tempfile_name(),
            client_secrets_path: default_client_secrets_path(),
            credentials_path: default_credentials_path(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            oauth_host: default_oauth_host(),
            oauth_ports: default_oauth_ports(),
            request_timeout_secs: default_request_timeout_secs(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

impl Config {
    /// 获取默认配置文件路径
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// 从文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            // 配置文件不存在，返回默认配置
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listing_url, "http://ceruliz.nl/maarten/backup/");
        assert_eq!(config.list_pattern, "bowielist");
        assert_eq!(config.drive_filename, "bowielist");
        assert_eq!(config.tempfile_name, "tmpfile.xlsx");
        assert_eq!(config.credentials_path, "mycreds.json");
        assert_eq!(config.oauth_host, "127.0.0.1");
        assert_eq!(config.oauth_ports, vec![8080, 8090]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "driveFilename": "other", "oauthPorts": [9000] }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.drive_filename, "other");
        assert_eq!(config.oauth_ports, vec![9000]);
        assert_eq!(config.list_pattern, "bowielist");
        assert!(config.proxy_url.is_none());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let path = std::env::temp_dir().join(format!("{}.json", uuid::Uuid::new_v4()));
        let config = Config::load(&path).unwrap();
        assert_eq!(config.tempfile_name, "tmpfile.xlsx");
    }

    #[test]
    fn test_normalized_listing_url() {
        let mut config = Config::default();
        config.listing_url = "http://example.com/backup".to_string();
        assert_eq!(config.normalized_listing_url(), "http://example.com/backup/");
        config.listing_url = "http://example.com/backup/".to_string();
        assert_eq!(config.normalized_listing_url(), "http://example.com/backup/");
    }

    #[test]
    fn test_parse_ports() {
        assert_eq!(parse_ports("8080, 8090,x"), vec![8080, 8090]);
        assert!(parse_ports("").is_empty());
    }
}

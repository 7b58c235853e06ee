//! HTTP Client 构建模块
//!
//! 目录抓取、OAuth 令牌交换和 Drive 上传共用同一个 Client

use reqwest::{Client, Proxy};
use std::time::Duration;

use crate::model::config::Config;

/// 所有请求携带的 User-Agent
pub const USER_AGENT: &str = concat!("list-to-sheets/", env!("CARGO_PKG_VERSION"));

/// 代理配置
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// 代理地址，支持 http/https/socks5
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// 从 url 创建代理配置
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// 设置认证信息
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// 从应用配置读取代理，未配置地址时返回 None
    pub fn from_config(config: &Config) -> Option<Self> {
        let url = config.proxy_url.as_deref().filter(|u| !u.is_empty())?;
        let proxy = Self::new(url);
        match (&config.proxy_username, &config.proxy_password) {
            (Some(username), Some(password)) => Some(proxy.with_auth(username, password)),
            _ => Some(proxy),
        }
    }
}

/// 构建 HTTP Client
///
/// # Arguments
/// * `proxy` - 可选的代理配置
/// * `timeout_secs` - 超时时间（秒）
pub fn build_client(proxy: Option<&ProxyConfig>, timeout_secs: u64) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT);

    if let Some(proxy_config) = proxy {
        let mut proxy = Proxy::all(&proxy_config.url)?;

        if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password) {
            proxy = proxy.basic_auth(username, password);
        }

        builder = builder.proxy(proxy);
        tracing::debug!("HTTP Client 使用代理: {}", proxy_config.url);
    }

    Ok(builder.build()?)
}

/// 按应用配置构建 Client
pub fn client_from_config(config: &Config) -> anyhow::Result<Client> {
    let proxy = ProxyConfig::from_config(config);
    build_client(proxy.as_ref(), config.request_timeout_secs)
}

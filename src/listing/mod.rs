//! 在线列表
//!
//! 抓取目录页面，找出最新发布的列表文件

pub mod parser;

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::model::config::Config;

pub use parser::parse_listing;

/// 在线的最新列表
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentList {
    pub url: String,
    /// url 的最后一段
    pub filename: String,
    pub last_modified: DateTime<Utc>,
}

impl CurrentList {
    pub fn new(url: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        let url = url.into();
        let segment = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        let filename = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        Self {
            url,
            filename,
            last_modified,
        }
    }
}

/// 下载目录页面并找出最新列表
pub async fn fetch_current_list(client: &Client, config: &Config) -> anyhow::Result<CurrentList> {
    let url = config.normalized_listing_url();
    tracing::debug!("从 {} 获取最新列表", url);

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("目录页面请求失败: {} {}", response.status(), url);
    }
    let html = response.text().await?;

    let current = parse_listing(&html, &url, &config.list_pattern)?;
    tracing::debug!("找到最新列表: {:?}", current);
    Ok(current)
}

//! Google Drive API v2 客户端
//!
//! 只实现同步需要的三个操作：按标题查找、新建上传、覆盖上传。
//! 上传统一带 `convert=true`，xlsx 会被转换为 Google 表格。

use std::path::Path;
use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use tokio::sync::Mutex;

use crate::google::model::drive::{DriveFile, FileList, UploadMetadata};
use crate::google::token_manager::TokenManager;

const API_BASE: &str = "https://www.googleapis.com";

/// xlsx 的 MIME 类型
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// 同步逻辑依赖的 Drive 操作
#[allow(async_fn_in_trait)]
pub trait DriveStore {
    /// 按标题查找未删除的文件，多个匹配时取第一个
    async fn find_file(&self, title: &str) -> anyhow::Result<Option<DriveFile>>;

    /// 上传为新文件
    async fn create_file(&self, title: &str, path: &Path) -> anyhow::Result<DriveFile>;

    /// 覆盖已有文件的内容
    async fn update_file(&self, id: &str, path: &Path) -> anyhow::Result<DriveFile>;
}

pub struct DriveClient {
    token_manager: Arc<Mutex<TokenManager>>,
    client: Client,
    files_url: String,
    upload_url: String,
}

impl DriveClient {
    pub fn new(token_manager: Arc<Mutex<TokenManager>>, client: Client) -> Self {
        Self {
            token_manager,
            client,
            files_url: String::new(),
            upload_url: String::new(),
        }
        .with_base_url(API_BASE)
    }

    /// 指定 API 根地址（不带结尾 `/`）
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.files_url = format!("{}/drive/v2/files", base);
        self.upload_url = format!("{}/upload/drive/v2/files", base);
        self
    }

    async fn bearer(&self) -> anyhow::Result<HeaderValue> {
        let token = self.token_manager.lock().await.ensure_valid_token().await?;
        Ok(HeaderValue::from_str(&format!("Bearer {}", token))?)
    }

    async fn upload(
        &self,
        method: Method,
        url: String,
        metadata: &UploadMetadata<'_>,
        path: &Path,
    ) -> anyhow::Result<DriveFile> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("无法读取待上传文件 {:?}: {}", path, e))?;
        let boundary = format!("list_to_sheets_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &serde_json::to_string(metadata)?, XLSX_MIME, &content);

        let response = self
            .client
            .request(method, &url)
            .header(AUTHORIZATION, self.bearer().await?)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("convert", "true")])
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Drive 上传失败: {} {}", status, body);
        }

        Ok(response.json::<DriveFile>().await?)
    }
}

impl DriveStore for DriveClient {
    async fn find_file(&self, title: &str) -> anyhow::Result<Option<DriveFile>> {
        let query = title_query(title);
        tracing::debug!("查询 Drive 文件: {}", query);

        let response = self
            .client
            .get(&self.files_url)
            .header(AUTHORIZATION, self.bearer().await?)
            .query(&[("q", query.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Drive 查询失败: {} {}", status, body);
        }

        let list: FileList = response.json().await?;
        Ok(list.items.into_iter().next())
    }

    async fn create_file(&self, title: &str, path: &Path) -> anyhow::Result<DriveFile> {
        let metadata = UploadMetadata { title: Some(title) };
        self.upload(Method::POST, self.upload_url.clone(), &metadata, path)
            .await
    }

    async fn update_file(&self, id: &str, path: &Path) -> anyhow::Result<DriveFile> {
        let metadata = UploadMetadata { title: None };
        let url = format!("{}/{}", self.upload_url, urlencoding::encode(id));
        self.upload(Method::PUT, url, &metadata, path).await
    }
}

/// 构建 `title='...' and trashed=false` 查询，转义反斜杠和单引号
pub fn title_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('\'', "\\'");
    format!("title='{}' and trashed=false", escaped)
}

/// 构建 multipart/related 请求体：JSON 元数据 + 文件内容
pub fn multipart_related_body(
    boundary: &str,
    metadata_json: &str,
    mime: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `files.list` 响应
#[derive(Debug, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub items: Vec<DriveFile>,
}

/// Drive 文件资源（只取用到的字段）
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub modified_date: DateTime<Utc>,
}

/// 上传时附带的元数据
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
}

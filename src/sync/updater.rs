//! 列表更新器
//!
//! 比较在线列表与 Drive 上的副本，需要时下载并上传。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::Client;

use crate::google::drive::DriveStore;
use crate::google::model::drive::DriveFile;
use crate::listing::CurrentList;

/// Drive 上的列表
#[derive(Debug, Clone, PartialEq)]
pub struct DriveList {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

impl From<DriveFile> for DriveList {
    fn from(file: DriveFile) -> Self {
        Self {
            id: file.id,
            last_modified: file.modified_date,
        }
    }
}

/// 同步决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Drive 上没有该文件
    Create,
    /// 在线列表更新，覆盖已有文件
    Overwrite { id: String },
    UpToDate,
}

/// 同步结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Created { id: String },
    Updated { id: String },
    UpToDate,
}

/// 只有在线列表严格更新时才覆盖
pub fn decide(current: &CurrentList, drive: Option<&DriveList>) -> SyncAction {
    match drive {
        None => SyncAction::Create,
        Some(existing) if current.last_modified > existing.last_modified => SyncAction::Overwrite {
            id: existing.id.clone(),
        },
        Some(_) => SyncAction::UpToDate,
    }
}

/// 查询 Drive 上的列表
pub async fn get_drive_list<D: DriveStore>(drive: &D, title: &str) -> anyhow::Result<Option<DriveList>> {
    let list = drive.find_file(title).await?.map(DriveList::from);
    tracing::debug!("Drive 上的列表: {:?}", list);
    Ok(list)
}

pub struct ListUpdater<'a, D: DriveStore> {
    drive: &'a D,
    client: &'a Client,
    current_list: CurrentList,
    drive_list: Option<DriveList>,
    tempfile: PathBuf,
    drive_filename: String,
}

impl<'a, D: DriveStore> ListUpdater<'a, D> {
    pub fn new(
        drive: &'a D,
        client: &'a Client,
        current_list: CurrentList,
        drive_list: Option<DriveList>,
    ) -> Self {
        Self {
            drive,
            client,
            current_list,
            drive_list,
            tempfile: PathBuf::from("tmpfile.xlsx"),
            drive_filename: "bowielist".to_string(),
        }
    }

    pub fn with_tempfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.tempfile = path.into();
        self
    }

    pub fn with_drive_filename(mut self, name: impl Into<String>) -> Self {
        self.drive_filename = name.into();
        self
    }

    /// 在线列表比 Drive 上的新时下载并上传；临时文件无论成败都会删除
    pub async fn run(&self) -> anyhow::Result<SyncOutcome> {
        let action = decide(&self.current_list, self.drive_list.as_ref());
        if action == SyncAction::UpToDate {
            tracing::info!("最新列表已上传，无需更新");
            return Ok(SyncOutcome::UpToDate);
        }

        let result = self.download_and_upload(action).await;
        self.delete_tempfile().await;
        result
    }

    async fn download_and_upload(&self, action: SyncAction) -> anyhow::Result<SyncOutcome> {
        self.download_list().await?;

        tracing::debug!(
            "上传 {} 到 Google Drive，标题 '{}'",
            self.tempfile.display(),
            self.drive_filename
        );
        match action {
            SyncAction::Overwrite { id } => {
                tracing::info!(
                    "找到 Drive 文件 '{}' ({})，用更新的 '{}' 覆盖",
                    self.drive_filename,
                    id,
                    self.current_list.filename
                );
                let file = self.drive.update_file(&id, &self.tempfile).await?;
                Ok(SyncOutcome::Updated { id: file.id })
            }
            SyncAction::Create => {
                tracing::info!(
                    "Drive 上没有 '{}'，从 '{}' 新建",
                    self.drive_filename,
                    self.current_list.filename
                );
                let file = self
                    .drive
                    .create_file(&self.drive_filename, &self.tempfile)
                    .await?;
                Ok(SyncOutcome::Created { id: file.id })
            }
            SyncAction::UpToDate => Ok(SyncOutcome::UpToDate),
        }
    }

    async fn download_list(&self) -> anyhow::Result<()> {
        tracing::debug!(
            "下载 {} 到 {}",
            self.current_list.url,
            self.tempfile.display()
        );
        let response = self.client.get(&self.current_list.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "下载列表失败: {} {}",
                response.status(),
                self.current_list.url
            );
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(&self.tempfile, &bytes).await?;
        Ok(())
    }

    async fn delete_tempfile(&self) {
        if !Path::new(&self.tempfile).exists() {
            return;
        }
        tracing::debug!("删除临时文件 {}", self.tempfile.display());
        if let Err(e) = tokio::fs::remove_file(&self.tempfile).await {
            tracing::warn!("删除临时文件 {} 失败: {}", self.tempfile.display(), e);
        }
    }
}

//! 同步流程
//!
//! 登录 Google → 抓取在线最新列表 → 查询 Drive 副本 → 必要时上传

pub mod updater;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::google::drive::DriveClient;
use crate::google::model::credentials::{ClientSecrets, StoredCredentials};
use crate::google::token_manager::TokenManager;
use crate::http_client::client_from_config;
use crate::listing::fetch_current_list;
use crate::model::config::Config;

pub use updater::SyncOutcome;

use updater::{get_drive_list, ListUpdater};

/// 执行一次完整同步
pub async fn run(config: Config) -> anyhow::Result<SyncOutcome> {
    let client = client_from_config(&config)?;

    let secrets = ClientSecrets::load(&config.client_secrets_path)?;
    let credentials = StoredCredentials::load(&config.credentials_path)?;
    let mut token_manager = TokenManager::new(config.clone(), secrets, credentials, client.clone());
    token_manager.login().await?;

    let drive = DriveClient::new(Arc::new(Mutex::new(token_manager)), client.clone());

    let current_list = fetch_current_list(&client, &config).await?;
    let drive_list = get_drive_list(&drive, &config.drive_filename).await?;

    ListUpdater::new(&drive, &client, current_list, drive_list)
        .with_tempfile(&config.tempfile_name)
        .with_drive_filename(&config.drive_filename)
        .run()
        .await
}

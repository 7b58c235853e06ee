mod google;
mod http_client;
mod listing;
mod logging;
mod model;
mod sorter;
mod sync;

use std::path::Path;
use std::process;

use clap::Parser;

use model::arg::{Args, Command};
use model::config::Config;
use sync::SyncOutcome;

#[tokio::main]
async fn main() {
    // .env 中的变量优先于配置文件
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("加载配置失败 {}: {}", config_path, e);
            process::exit(1);
        }
    };
    config.override_from_env();
    if let Some(path) = args.credentials {
        config.credentials_path = path;
    }
    if let Some(path) = args.client_secrets {
        config.client_secrets_path = path;
    }

    if let Err(e) = logging::init(&config.log_file, &config.log_level) {
        eprintln!("初始化日志失败 {}: {}", config.log_file, e);
        process::exit(1);
    }

    let result = match args.command.unwrap_or(Command::Sync) {
        Command::Sync => run_sync(config).await,
        Command::Sort {
            workbook,
            output,
            list_countries,
        } => run_sort(&workbook, &output, list_countries),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        process::exit(1);
    }
}

async fn run_sync(config: Config) -> anyhow::Result<()> {
    match sync::run(config).await? {
        SyncOutcome::Created { id } => tracing::info!("已新建 Drive 文件 {}", id),
        SyncOutcome::Updated { id } => tracing::info!("已更新 Drive 文件 {}", id),
        SyncOutcome::UpToDate => {}
    }
    Ok(())
}

fn run_sort(workbook: &str, output: &str, list_countries: bool) -> anyhow::Result<()> {
    let workbook = Path::new(workbook);
    if list_countries {
        let countries = sorter::country_list(workbook, sorter::SHEET_NAMES)?;
        println!("{}", countries.join(", "));
        return Ok(());
    }

    let written = sorter::sort_workbook(
        workbook,
        sorter::SHEET_NAMES,
        Path::new(output),
        sorter::COUNTRY_ORDER,
    )?;
    tracing::info!("共写入 {} 个文件", written.len());
    Ok(())
}

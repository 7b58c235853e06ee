use clap::{Parser, Subcommand};

/// 将最新的 bowielist 同步到 Google Drive
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<String>,

    /// OAuth 令牌缓存文件路径
    #[arg(long)]
    pub credentials: Option<String>,

    /// OAuth 客户端密钥文件路径
    #[arg(long)]
    pub client_secrets: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 检查并上传最新列表（默认）
    Sync,
    /// 按标题和国家顺序重排本地工作簿
    Sort {
        /// 待排序的 xlsx 文件
        workbook: String,

        /// 输出目录
        #[arg(short, long, default_value = "Output")]
        output: String,

        /// 只打印所有工作表中出现的国家代码
        #[arg(long)]
        list_countries: bool,
    },
}

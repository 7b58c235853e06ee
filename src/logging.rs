//! 日志初始化
//!
//! 终端输出 + 文件输出两路；日志文件每周一轮转一次。

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDateTime, NaiveTime};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 兼容 WARNING / CRITICAL 之类的写法
pub fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

fn directives(level: &str) -> String {
    format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,rustls=warn",
        normalize_level(level)
    )
}

/// 日志文件的行格式：`<时间> <级别> [<target>] <消息>`
struct FileFormat;

impl<S, N> FormatEvent<S, N> for FileFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{} {} [{}] ",
            Local::now().format(TIME_FORMAT),
            metadata.level(),
            metadata.target()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn file_layer<S>(file: File) -> fmt::Layer<S, DefaultFields, FileFormat, Mutex<File>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(FileFormat)
}

/// 本周一 00:00（本地时间）
pub fn week_start(now: DateTime<Local>) -> NaiveDateTime {
    let date = now.date_naive() - Duration::days(now.weekday().num_days_from_monday() as i64);
    date.and_time(NaiveTime::MIN)
}

/// 日志文件最后写入早于本周一时，重命名为 `<name>.<YYYY-MM-DD>`
pub fn rotate_if_stale(path: &Path, now: DateTime<Local>) -> anyhow::Result<Option<PathBuf>> {
    let Ok(metadata) = fs::metadata(path) else {
        return Ok(None);
    };
    let modified: DateTime<Local> = metadata.modified()?.into();
    if modified.naive_local() >= week_start(now) {
        return Ok(None);
    }

    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", modified.format("%Y-%m-%d")));
    let rotated = PathBuf::from(name);
    fs::rename(path, &rotated)?;
    Ok(Some(rotated))
}

/// 初始化全局日志
pub fn init(log_file: &str, log_level: &str) -> anyhow::Result<()> {
    let path = Path::new(log_file);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let rotated = rotate_if_stale(path, Local::now())?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let filter = EnvFilter::try_new(directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(directives("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_target(false),
        )
        .with(file_layer(file))
        .try_init()?;

    if let Some(rotated) = rotated {
        tracing::debug!("旧日志已轮转到 {}", rotated.display());
    }
    Ok(())
}

//! 目录列表解析
//!
//! 支持两种常见的自动索引页面：
//! - Apache `<table>`：每行一个链接，另有 "Last modified" 列
//! - nginx `<pre>`：链接后面紧跟 `12-Nov-2023 14:05   1234` 形式的文本

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::CurrentList;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%b-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M",
];

/// 目录中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub name: String,
    pub href: String,
    pub last_modified: DateTime<Utc>,
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("无效的选择器 {}: {}", css, e))
}

/// 解析目录里的日期，按本地时区（TZ）解释
pub fn parse_listing_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let naive = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())?;
    Some(match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // 夏令时跳过的时刻
        None => Utc.from_utc_datetime(&naive),
    })
}

/// 排序链接、上级目录等不是文件条目
fn is_navigation_link(href: &str, name: &str) -> bool {
    href.starts_with('?')
        || href == "../"
        || href == "/"
        || name.eq_ignore_ascii_case("parent directory")
}

fn link_of(element: ElementRef<'_>, anchor: &Selector) -> Option<(String, String)> {
    let link = element.select(anchor).next()?;
    let href = link.value().attr("href")?.to_string();
    let name = link.text().collect::<String>().trim().to_string();
    if is_navigation_link(&href, &name) {
        return None;
    }
    Some((name, href))
}

fn table_entries(document: &Html) -> anyhow::Result<Vec<ListingEntry>> {
    let rows = selector("tr")?;
    let cells = selector("td")?;
    let anchor = selector("a[href]")?;

    let mut entries = Vec::new();
    for row in document.select(&rows) {
        let Some((name, href)) = link_of(row, &anchor) else {
            continue;
        };
        let last_modified = row
            .select(&cells)
            .find_map(|cell| parse_listing_date(&cell.text().collect::<String>()));
        if let Some(last_modified) = last_modified {
            entries.push(ListingEntry {
                name,
                href,
                last_modified,
            });
        }
    }
    Ok(entries)
}

fn pre_entries(document: &Html) -> anyhow::Result<Vec<ListingEntry>> {
    let anchor = selector("pre a[href]")?;

    let mut entries = Vec::new();
    for link in document.select(&anchor) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let name = link.text().collect::<String>().trim().to_string();
        if is_navigation_link(href, &name) {
            continue;
        }
        // 链接后的文本节点: "12-Nov-2023 14:05    1234"
        let trailing = link
            .next_sibling()
            .and_then(|node| node.value().as_text().map(|t| t.to_string()))
            .unwrap_or_default();
        let tokens: Vec<&str> = trailing.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        if let Some(last_modified) = parse_listing_date(&format!("{} {}", tokens[0], tokens[1])) {
            entries.push(ListingEntry {
                name,
                href: href.to_string(),
                last_modified,
            });
        }
    }
    Ok(entries)
}

/// 解析页面中的全部文件条目
pub fn parse_entries(html: &str) -> anyhow::Result<Vec<ListingEntry>> {
    let document = Html::parse_document(html);
    let entries = table_entries(&document)?;
    if !entries.is_empty() {
        return Ok(entries);
    }
    pre_entries(&document)
}

/// 选出名称包含 `pattern` 的最新条目；时间相同时保留页面中靠前的
pub fn select_latest<'a>(entries: &'a [ListingEntry], pattern: &str) -> Option<&'a ListingEntry> {
    let mut latest: Option<&ListingEntry> = None;
    for entry in entries.iter().filter(|e| e.name.contains(pattern)) {
        match latest {
            Some(current) if entry.last_modified <= current.last_modified => {}
            _ => latest = Some(entry),
        }
    }
    latest
}

/// 解析目录页面，返回最新的列表文件
pub fn parse_listing(html: &str, base_url: &str, pattern: &str) -> anyhow::Result<CurrentList> {
    let entries = parse_entries(html)?;
    let latest = select_latest(&entries, pattern).ok_or_else(|| {
        anyhow::anyhow!("在 {} 中找不到名称包含 '{}' 的文件", base_url, pattern)
    })?;

    let url = Url::parse(base_url)?.join(&latest.href)?;
    Ok(CurrentList::new(url.to_string(), latest.last_modified))
}

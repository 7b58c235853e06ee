//! 工作表排序
//!
//! 同一标题的行归为一组（组号按出现顺序递增），组内按国家顺序排列，
//! 每个工作表输出为单独的 xlsx。

pub mod workbook;

use std::fmt;
use std::path::{Path, PathBuf};

pub use workbook::{country_list, sort_workbook};

/// 需要排序的工作表
pub const SHEET_NAMES: &[&str] = &[
    "7\"-off",
    "7\"-related",
    "12\"-off",
    "12\"-pro",
    "LP-off",
    "LP-related",
    "LP-pirate",
    "CD-single",
    "CD-pro",
];

/// 国家排序权重，越靠前越优先
pub const COUNTRY_ORDER: &[&str] = &[
    "UK", "AU", "BEL", "CRO", "CZ", "DEN", "FI", "FRA", "GER", "GR", "IRE", "IS", "ITA", "NL",
    "NOR", "POL", "POR", "SCA", "SPA", "SWE", "SWI", "RUS", "TUR", "YUG", "USA", "CAN", "ARG",
    "BRA", "CHI", "COL", "CR", "GUA", "MEX", "PAR", "PER", "SV", "VEN", "JAP", "IND", "HK", "KOR",
    "MAL", "PHI", "SEA", "SIN", "TAI", "THA", "ISR", "AUS", "NZ", "SA", "ANG", "RHO", "ZIM", "EU",
];

pub const TITLE_COLUMN: &str = "TITLE";
pub const COUNTRY_COLUMN: &str = "CTY";

/// 单元格的值
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel 序列日期
    Date(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) | Cell::Date(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// 一个工作表：首行为表头
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn column(&self, name: &str) -> anyhow::Result<usize> {
        self.header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow::anyhow!("工作表缺少 {} 列", name))
    }
}

fn cell_text(row: &[Cell], col: usize) -> String {
    row.get(col).map(|c| c.to_string()).unwrap_or_default()
}

/// 计算每行的（标题组号, 国家权重）
///
/// 标题与上一行不同时组号加一，空标题每行单独成组；
/// 不在顺序表中的国家排在组内最后
pub fn sort_keys(sheet: &Sheet, order: &[&str]) -> anyhow::Result<Vec<(usize, usize)>> {
    let title_col = sheet.column(TITLE_COLUMN)?;
    let country_col = sheet.column(COUNTRY_COLUMN)?;

    let mut keys = Vec::with_capacity(sheet.rows.len());
    let mut sort_index = 0;
    let mut prev_title: Option<String> = None;

    for row in &sheet.rows {
        let blank = matches!(row.get(title_col), None | Some(Cell::Empty));
        let title = cell_text(row, title_col);
        if blank || prev_title.as_deref() != Some(title.as_str()) {
            sort_index += 1;
        }

        let country = cell_text(row, country_col);
        let weight = match order.iter().position(|c| *c == country.trim()) {
            Some(pos) => pos,
            None => {
                tracing::warn!("未知国家 '{}' (标题 '{}')", country, title);
                order.len()
            }
        };

        keys.push((sort_index, weight));
        prev_title = (!blank).then_some(title);
    }
    Ok(keys)
}

/// 按（标题组号, 国家权重）稳定排序
pub fn sort_rows(sheet: &mut Sheet, order: &[&str]) -> anyhow::Result<()> {
    let keys = sort_keys(sheet, order)?;
    let mut keyed: Vec<_> = keys.into_iter().zip(sheet.rows.drain(..)).collect();
    keyed.sort_by_key(|(key, _)| *key);
    sheet.rows = keyed.into_iter().map(|(_, row)| row).collect();
    Ok(())
}

/// 输出文件：`<工作表名中的字母数字>_<原文件名>.xlsx`
pub fn sheet_output_path(output_dir: &Path, sheet_name: &str, workbook: &Path) -> PathBuf {
    let sheet: String = sheet_name.chars().filter(|c| c.is_alphanumeric()).collect();
    let file_name = workbook
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir
        .join(format!("{}_{}", sheet, file_name))
        .with_extension("xlsx")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn sheet(rows: &[(&str, &str)]) -> Sheet {
        Sheet {
            header: vec!["TITLE".to_string(), "CTY".to_string(), "CAT".to_string()],
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, (title, cty))| vec![text(title), text(cty), Cell::Number(i as f64)])
                .collect(),
        }
    }

    fn cat_numbers(sheet: &Sheet) -> Vec<f64> {
        sheet
            .rows
            .iter()
            .map(|r| match r[2] {
                Cell::Number(n) => n,
                _ => -1.0,
            })
            .collect()
    }

    #[test]
    fn test_constants() {
        assert_eq!(SHEET_NAMES.len(), 9);
        assert_eq!(COUNTRY_ORDER.len(), 55);
        assert_eq!(COUNTRY_ORDER[0], "UK");
        assert_eq!(COUNTRY_ORDER[54], "EU");
    }

    #[test]
    fn test_sort_keys() {
        let s = sheet(&[("Heroes", "USA"), ("Heroes", "UK"), ("Low", "NL"), ("Heroes", "GER")]);
        let keys = sort_keys(&s, COUNTRY_ORDER).unwrap();
        // 标题再次出现也算新组
        assert_eq!(keys, vec![(1, 24), (1, 0), (2, 13), (3, 8)]);
    }

    #[test]
    fn test_blank_titles_keep_their_position() {
        let mut s = sheet(&[("Heroes", "UK"), ("Heroes", "USA")]);
        s.rows.push(vec![Cell::Empty, text("USA"), Cell::Number(2.0)]);
        s.rows.push(vec![Cell::Empty, text("UK"), Cell::Number(3.0)]);
        s.rows.push(vec![Cell::Empty, text("NL"), Cell::Number(4.0)]);

        let keys = sort_keys(&s, COUNTRY_ORDER).unwrap();
        assert_eq!(keys, vec![(1, 0), (1, 24), (2, 24), (3, 0), (4, 13)]);

        sort_rows(&mut s, COUNTRY_ORDER).unwrap();
        assert_eq!(cat_numbers(&s), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sort_rows_orders_by_group_then_country() {
        let mut s = sheet(&[
            ("Heroes", "USA"),
            ("Heroes", "UK"),
            ("Heroes", "NL"),
            ("Low", "JAP"),
            ("Low", "FRA"),
        ]);
        sort_rows(&mut s, COUNTRY_ORDER).unwrap();
        assert_eq!(cat_numbers(&s), vec![1.0, 2.0, 0.0, 4.0, 3.0]);
    }

    #[test]
    fn test_unknown_country_sorts_last_in_group() {
        let mut s = sheet(&[("Heroes", "XX"), ("Heroes", "EU"), ("Heroes", "UK")]);
        sort_rows(&mut s, COUNTRY_ORDER).unwrap();
        assert_eq!(cat_numbers(&s), vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_equal_keys_keep_input_order() {
        let mut s = sheet(&[("Heroes", "UK"), ("Heroes", "UK"), ("Heroes", "AU")]);
        sort_rows(&mut s, COUNTRY_ORDER).unwrap();
        assert_eq!(cat_numbers(&s), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_missing_column() {
        let s = Sheet {
            header: vec!["TITLE".to_string()],
            rows: vec![],
        };
        assert!(sort_keys(&s, COUNTRY_ORDER).is_err());
    }

    #[test]
    fn test_sheet_output_path() {
        let path = sheet_output_path(
            Path::new("Output"),
            "7\"-off",
            Path::new("/data/bowielist_12-11-23.xlsx"),
        );
        assert_eq!(path, PathBuf::from("Output/7off_bowielist_12-11-23.xlsx"));

        let path = sheet_output_path(Path::new("out"), "CD-single", Path::new("list.xls"));
        assert_eq!(path, PathBuf::from("out/CDsingle_list.xlsx"));
    }
}

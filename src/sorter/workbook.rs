//! xlsx 读写

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};

use super::{sheet_output_path, sort_rows, Cell, Sheet, COUNTRY_COLUMN};

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("{:?}", e)),
    }
}

/// 读取一个工作表
pub fn read_sheet(path: &Path, sheet_name: &str) -> anyhow::Result<Sheet> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| anyhow::anyhow!("无法打开工作簿 {:?}: {}", path, e))?;
    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| anyhow::anyhow!("无法读取工作表 '{}': {}", sheet_name, e))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|c| to_cell(c).to_string()).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(to_cell).collect())
        .collect();

    Ok(Sheet { header, rows })
}

/// 写出工作表：表头加粗，日期按 yyyy-mm-dd 显示
pub fn write_sheet(path: &Path, sheet: &Sheet) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let worksheet = workbook.add_worksheet();

    for (col, name) in sheet.header.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, name, &header_format)?;
    }

    for (r, row) in sheet.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    worksheet.write_string(r, col, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(r, col, *n)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(r, col, *b)?;
                }
                Cell::Date(n) => {
                    worksheet.write_number_with_format(r, col, *n, &date_format)?;
                }
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// 逐个工作表排序并写入 `output_dir`，返回生成的文件
pub fn sort_workbook(
    path: &Path,
    sheet_names: &[&str],
    output_dir: &Path,
    order: &[&str],
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::with_capacity(sheet_names.len());
    for sheet_name in sheet_names {
        let mut sheet = read_sheet(path, sheet_name)?;
        sort_rows(&mut sheet, order)?;

        let output = sheet_output_path(output_dir, sheet_name, path);
        write_sheet(&output, &sheet)?;
        tracing::info!("已写入 '{}' ({} 行) 到 {}", sheet_name, sheet.rows.len(), output.display());
        written.push(output);
    }
    Ok(written)
}

/// 所有工作表中出现过的国家代码，去重排序
pub fn country_list(path: &Path, sheet_names: &[&str]) -> anyhow::Result<Vec<String>> {
    let mut countries = BTreeSet::new();
    for sheet_name in sheet_names {
        let sheet = read_sheet(path, sheet_name)?;
        let col = sheet.column(COUNTRY_COLUMN)?;
        for row in &sheet.rows {
            if let Some(cell) = row.get(col) {
                if *cell != Cell::Empty {
                    countries.insert(cell.to_string());
                }
            }
        }
    }
    Ok(countries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::COUNTRY_ORDER;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// 生成包含两个工作表的测试工作簿
    fn write_fixture(path: &Path) {
        let mut workbook = Workbook::new();
        for (name, rows) in [
            ("LP-off", vec![("Heroes", "USA"), ("Heroes", "UK"), ("Low", "NL")]),
            ("CD-pro", vec![("Let's Dance", "JAP"), ("Let's Dance", "GER")]),
        ] {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(name).unwrap();
            worksheet.write_string(0, 0, "TITLE").unwrap();
            worksheet.write_string(0, 1, "CTY").unwrap();
            worksheet.write_string(0, 2, "YEAR").unwrap();
            for (i, (title, cty)) in rows.iter().enumerate() {
                let r = (i + 1) as u32;
                worksheet.write_string(r, 0, *title).unwrap();
                worksheet.write_string(r, 1, *cty).unwrap();
                worksheet.write_number(r, 2, 1977.0 + i as f64).unwrap();
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_sort_workbook() {
        let dir = temp_dir();
        let input = dir.join("bowielist_12-11-23.xlsx");
        write_fixture(&input);

        let output_dir = dir.join("Output");
        let written = sort_workbook(&input, &["LP-off", "CD-pro"], &output_dir, COUNTRY_ORDER).unwrap();
        assert_eq!(
            written,
            vec![
                output_dir.join("LPoff_bowielist_12-11-23.xlsx"),
                output_dir.join("CDpro_bowielist_12-11-23.xlsx"),
            ]
        );

        let sorted = read_sheet(&written[0], "Sheet1").unwrap();
        assert_eq!(sorted.header, vec!["TITLE", "CTY", "YEAR"]);
        let countries: Vec<String> = sorted.rows.iter().map(|r| r[1].to_string()).collect();
        assert_eq!(countries, vec!["UK", "USA", "NL"]);
        assert_eq!(sorted.rows[0][2], Cell::Number(1978.0));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_country_list() {
        let dir = temp_dir();
        let input = dir.join("list.xlsx");
        write_fixture(&input);

        let countries = country_list(&input, &["LP-off", "CD-pro"]).unwrap();
        assert_eq!(countries, vec!["GER", "JAP", "NL", "UK", "USA"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_sheet() {
        let dir = temp_dir();
        let input = dir.join("list.xlsx");
        write_fixture(&input);

        assert!(read_sheet(&input, "7\"-off").is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}

// ==========================================
// 毕业论文管理系统 - 名册文件解析器
// ==========================================
// 支持: Excel (.xlsx/.xls, 第一个工作表) / CSV (.csv, 带表头)
// 输出: 每行一个 表头 → 值 映射, 附带原始行号
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 解析后的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 文件中的行号 (表头为第 1 行)
    pub row_no: usize,
    /// 表头(小写) → 去空白后的值
    pub fields: HashMap<String, String>,
}

impl RawRow {
    /// 按候选列名取第一个非空值
    pub fn get(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.fields.get(*n))
            .map(|v| v.as_str())
            .find(|v| !v.is_empty())
    }
}

/// 文件解析接口
pub trait FileParser {
    fn parse_to_raw_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn normalize_header(h: &str) -> String {
    h.trim().trim_start_matches('\u{feff}').to_lowercase()
}

/// 组装一行; 完全空白的行返回 None
fn build_row<I>(row_no: usize, headers: &[String], values: I) -> Option<RawRow>
where
    I: IntoIterator<Item = String>,
{
    let fields: HashMap<String, String> = headers
        .iter()
        .cloned()
        .zip(values.into_iter().map(|v| v.trim().to_string()))
        .collect();
    if fields.values().all(|v| v.is_empty()) {
        return None;
    }
    Some(RawRow { row_no, fields })
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let row_no = record.position().map(|p| p.line() as usize).unwrap_or(idx + 2);
            if let Some(row) = build_row(row_no, &headers, record.iter().map(str::to_string)) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_rows(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        // xls / xlsx 由 calamine 按扩展名自动识别
        let mut workbook = open_workbook_auto(file_path)?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(ImportError::EmptyWorkbook)?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // 区域可能不从 A1 开始, 行号按工作表实际位置计算 (1 起)
        let header_line = range.start().map(|(r, _)| r as usize + 1).unwrap_or(1);
        let mut iter = range.rows();
        let Some(header_row) = iter.next() else {
            return Ok(Vec::new());
        };
        let headers: Vec<String> = header_row.iter().map(|c| normalize_header(&c.to_string())).collect();

        let mut rows = Vec::new();
        for (idx, data_row) in iter.enumerate() {
            let row_no = header_line + idx + 1;
            if let Some(row) = build_row(row_no, &headers, data_row.iter().map(|c| c.to_string())) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<Vec<RawRow>> {
        let path = file_path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_to_raw_rows(path),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_rows(path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        f
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let f = csv_file(&["NIM,Name,Program", "2020001, 学生甲 ,Informatika", "2020002,学生乙,Sistem Informasi"]);
        let rows = CsvParser.parse_to_raw_rows(f.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(&["registration_no", "nim"]), Some("2020001"));
        assert_eq!(rows[0].get(&["name"]), Some("学生甲"), "值应去除首尾空白");
        assert_eq!(rows[0].row_no, 2);
        assert_eq!(rows[1].row_no, 3);
    }

    #[test]
    fn test_csv_parser_skip_empty_rows_keeps_row_numbers() {
        let f = csv_file(&["nim,name", "2020001,甲", ",", "2020002,乙"]);
        let rows = CsvParser.parse_to_raw_rows(f.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].row_no, 4, "空行跳过但行号保持文件位置");
    }

    #[test]
    fn test_excel_parser_reads_first_sheet() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/students.xlsx");
        let rows = UniversalFileParser.parse(&path).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].row_no, 2);
        assert_eq!(rows[0].get(&["registration_no", "nim"]), Some("2021001"));
        assert_eq!(rows[0].get(&["angkatan"]), Some("2021"), "数值单元格按整数显示");
        assert_eq!(rows[1].get(&["nama"]), None, "空单元格视为缺失");
        assert_eq!(rows[2].row_no, 4);
    }

    #[test]
    fn test_file_not_found() {
        let result = CsvParser.parse_to_raw_rows(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = UniversalFileParser.parse("roster.txt");
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}

// ==========================================
// 毕业论文管理系统 - 名册导入器
// ==========================================
// 流程: 解析 → 行映射 → 重复检测 → 单事务落库
// 红线: 坏行只记录不落库, 不影响其它行; 重复键跳过并报告
// ==========================================

use crate::config::ConfigManager;
use crate::domain::lecturer::Lecturer;
use crate::domain::student::Student;
use crate::domain::types::Capability;
use crate::engine::clock::Clock;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{RawRow, UniversalFileParser};
use crate::repository::{EntityStore, LecturerRepository, StudentRepository};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 列名 (小写, 首个为标准名)
// ==========================================
const COL_REGISTRATION_NO: &[&str] = &["registration_no", "nim"];
const COL_EMPLOYEE_NO: &[&str] = &["employee_no", "nidn"];
const COL_NAME: &[&str] = &["name", "nama"];
const COL_PROGRAM: &[&str] = &["program", "prodi"];
const COL_BATCH_YEAR: &[&str] = &["batch_year", "angkatan"];
const COL_EXPERTISE: &[&str] = &["expertise"];
const COL_CAPABILITIES: &[&str] = &["capabilities"];
const COL_CAPACITY: &[&str] = &["capacity", "capacity_limit"];

const MIN_BATCH_YEAR: i32 = 1950;
const MAX_BATCH_YEAR: i32 = 2100;

// ==========================================
// ImportReport - 导入报告
// ==========================================

/// 单行问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub row_no: usize,
    pub key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RosterKind {
    Student,
    Lecturer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub kind: RosterKind,
    pub total_rows: usize,
    pub imported_ids: Vec<String>,
    pub skipped_duplicates: Vec<RowIssue>,
    pub errors: Vec<RowIssue>,
}

impl ImportReport {
    fn new(kind: RosterKind, total_rows: usize) -> Self {
        Self {
            kind,
            total_rows,
            imported_ids: Vec::new(),
            skipped_duplicates: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn imported(&self) -> usize {
        self.imported_ids.len()
    }
}

// ==========================================
// EnrollmentImporter
// ==========================================
pub struct EnrollmentImporter {
    store: Arc<EntityStore>,
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    parser: UniversalFileParser,
}

impl EnrollmentImporter {
    pub fn new(store: Arc<EntityStore>, config: Arc<ConfigManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            parser: UniversalFileParser,
        }
    }

    /// 导入学生名册
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_students<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ImportReport> {
        let rows = self.parser.parse(file_path.as_ref())?;
        require_column(&rows, COL_REGISTRATION_NO)?;
        let now = self.clock.now();

        let mut report = ImportReport::new(RosterKind::Student, rows.len());
        let candidates = collect_candidates(&rows, &mut report, |row| map_student_row(row, now));

        self.store.write(|tx| -> ImportResult<()> {
            for (row_no, student) in candidates {
                if StudentRepository::find_by_registration_no_tx(tx, &student.registration_no)?.is_some() {
                    report.skipped_duplicates.push(RowIssue {
                        row_no,
                        key: Some(student.registration_no.clone()),
                        message: "学号已存在".to_string(),
                    });
                    continue;
                }
                StudentRepository::insert_tx(tx, &student)?;
                report.imported_ids.push(student.student_id);
            }
            Ok(())
        })?;

        log_report(&report);
        Ok(report)
    }

    /// 导入教师名册 (容量缺省取配置 default_capacity_limit)
    #[instrument(skip(self, file_path), fields(file = %file_path.as_ref().display()))]
    pub fn import_lecturers<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ImportReport> {
        let rows = self.parser.parse(file_path.as_ref())?;
        require_column(&rows, COL_EMPLOYEE_NO)?;
        let default_capacity = self.config.get_default_capacity_limit()?;
        let now = self.clock.now();

        let mut report = ImportReport::new(RosterKind::Lecturer, rows.len());
        let candidates =
            collect_candidates(&rows, &mut report, |row| map_lecturer_row(row, default_capacity, now));

        self.store.write(|tx| -> ImportResult<()> {
            for (row_no, lecturer) in candidates {
                if LecturerRepository::find_by_employee_no_tx(tx, &lecturer.employee_no)?.is_some() {
                    report.skipped_duplicates.push(RowIssue {
                        row_no,
                        key: Some(lecturer.employee_no.clone()),
                        message: "工号已存在".to_string(),
                    });
                    continue;
                }
                LecturerRepository::insert_tx(tx, &lecturer)?;
                report.imported_ids.push(lecturer.lecturer_id);
            }
            Ok(())
        })?;

        log_report(&report);
        Ok(report)
    }
}

// ==========================================
// 行映射
// ==========================================

/// 带唯一键的导入候选
trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Student {
    fn key(&self) -> &str {
        &self.registration_no
    }
}

impl Keyed for Lecturer {
    fn key(&self) -> &str {
        &self.employee_no
    }
}

/// 逐行映射; 坏行与文件内重复记入报告
fn collect_candidates<T, F>(rows: &[RawRow], report: &mut ImportReport, map: F) -> Vec<(usize, T)>
where
    T: Keyed,
    F: Fn(&RawRow) -> Result<T, String>,
{
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for row in rows {
        match map(row) {
            Ok(entity) => {
                if !seen.insert(entity.key().to_string()) {
                    report.skipped_duplicates.push(RowIssue {
                        row_no: row.row_no,
                        key: Some(entity.key().to_string()),
                        message: "文件内重复".to_string(),
                    });
                    continue;
                }
                candidates.push((row.row_no, entity));
            }
            Err(message) => {
                warn!(row_no = row.row_no, %message, "名册行无效");
                report.errors.push(RowIssue {
                    row_no: row.row_no,
                    key: None,
                    message,
                });
            }
        }
    }
    candidates
}

fn required<'a>(row: &'a RawRow, names: &[&str]) -> Result<&'a str, String> {
    row.get(names).ok_or_else(|| format!("{} 为空", names[0]))
}

pub(crate) fn map_student_row(row: &RawRow, now: NaiveDateTime) -> Result<Student, String> {
    let registration_no = required(row, COL_REGISTRATION_NO)?;
    let name = required(row, COL_NAME)?;
    let program = required(row, COL_PROGRAM)?;
    let batch_raw = required(row, COL_BATCH_YEAR)?;
    let batch_year: i32 = parse_number(batch_raw).ok_or_else(|| format!("batch_year 不是整数: {}", batch_raw))?;
    if !(MIN_BATCH_YEAR..=MAX_BATCH_YEAR).contains(&batch_year) {
        return Err(format!(
            "batch_year 超出范围 [{}, {}]: {}",
            MIN_BATCH_YEAR, MAX_BATCH_YEAR, batch_year
        ));
    }
    Ok(Student::new(registration_no, name, program, batch_year, now))
}

pub(crate) fn map_lecturer_row(row: &RawRow, default_capacity: i32, now: NaiveDateTime) -> Result<Lecturer, String> {
    let employee_no = required(row, COL_EMPLOYEE_NO)?;
    let name = required(row, COL_NAME)?;

    let capabilities = match row.get(COL_CAPABILITIES) {
        None => BTreeSet::from([Capability::Supervisor, Capability::Examiner]),
        Some(raw) => split_list(raw)
            .map(|c| Capability::from_db_str(c).ok_or_else(|| format!("未知能力: {}", c)))
            .collect::<Result<BTreeSet<_>, _>>()?,
    };
    if capabilities.is_empty() {
        return Err("capabilities 为空".to_string());
    }

    let capacity_limit = match row.get(COL_CAPACITY) {
        None => default_capacity,
        Some(raw) => parse_number(raw).ok_or_else(|| format!("capacity 不是整数: {}", raw))?,
    };
    if capacity_limit < 0 {
        return Err(format!("capacity 不能为负数: {}", capacity_limit));
    }

    let expertise = row.get(COL_EXPERTISE).map(|raw| split_list(raw).collect::<Vec<_>>()).unwrap_or_default();
    Ok(Lecturer::new(employee_no, name, capabilities, capacity_limit, now).with_expertise(expertise))
}

/// `;` 或 `,` 分隔的列表
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([';', ',']).map(str::trim).filter(|s| !s.is_empty())
}

/// 整数解析; 兼容 Excel 数值单元格的 "2020.0"
fn parse_number(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>().ok().or_else(|| {
        let f = raw.parse::<f64>().ok()?;
        (f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64).then(|| f as i32)
    })
}

fn require_column(rows: &[RawRow], names: &[&str]) -> ImportResult<()> {
    match rows.first() {
        Some(first) if !names.iter().any(|n| first.fields.contains_key(*n)) => {
            Err(ImportError::MissingColumn(names.join(" / ")))
        }
        _ => Ok(()),
    }
}

fn log_report(report: &ImportReport) {
    info!(
        kind = ?report.kind,
        total = report.total_rows,
        imported = report.imported(),
        duplicates = report.skipped_duplicates.len(),
        errors = report.errors.len(),
        "名册导入完成"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn row(row_no: usize, pairs: &[(&str, &str)]) -> RawRow {
        RawRow {
            row_no,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_map_student_row_accepts_alias_columns() {
        let r = row(2, &[("nim", "2020001"), ("name", "学生甲"), ("program", "Informatika"), ("batch_year", "2020.0")]);
        let s = map_student_row(&r, now()).unwrap();
        assert_eq!(s.registration_no, "2020001");
        assert_eq!(s.batch_year, 2020);
    }

    #[test]
    fn test_map_student_row_rejects_bad_year() {
        let r = row(3, &[("nim", "2020001"), ("name", "甲"), ("program", "TI"), ("batch_year", "二〇二〇")]);
        let err = map_student_row(&r, now()).unwrap_err();
        assert!(err.contains("batch_year"));
    }

    #[test]
    fn test_map_lecturer_row_defaults() {
        let r = row(2, &[("nidn", "0011"), ("name", "教师甲"), ("expertise", "AI; Data Mining ;")]);
        let l = map_lecturer_row(&r, 8, now()).unwrap();
        assert_eq!(l.capacity_limit, 8, "缺省容量取配置值");
        assert!(l.has_capability(Capability::Supervisor));
        assert!(l.has_capability(Capability::Examiner));
        assert!(l.expertise_tags.contains("data mining"));
        assert_eq!(l.expertise_tags.len(), 2);
    }

    #[test]
    fn test_map_lecturer_row_rejects_unknown_capability() {
        let r = row(2, &[("nidn", "0011"), ("name", "教师甲"), ("capabilities", "supervisor;dean")]);
        assert!(map_lecturer_row(&r, 8, now()).unwrap_err().contains("dean"));
    }

    #[test]
    fn test_collect_candidates_reports_in_file_duplicates() {
        let rows = vec![
            row(2, &[("nim", "A1"), ("name", "甲"), ("program", "TI"), ("batch_year", "2020")]),
            row(3, &[("nim", "A1"), ("name", "乙"), ("program", "TI"), ("batch_year", "2020")]),
            row(4, &[("nim", "A2"), ("name", ""), ("program", "TI"), ("batch_year", "2020")]),
        ];
        let mut report = ImportReport::new(RosterKind::Student, rows.len());
        let candidates = collect_candidates(&rows, &mut report, |r| map_student_row(r, now()));

        assert_eq!(candidates.len(), 1);
        assert_eq!(report.skipped_duplicates.len(), 1);
        assert_eq!(report.skipped_duplicates[0].row_no, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row_no, 4);
    }
}

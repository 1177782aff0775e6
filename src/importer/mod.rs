// ==========================================
// 毕业论文管理系统 - 导入层
// ==========================================
// 职责: 学生/教师名册导入
// 支持: Excel, CSV
// ==========================================

pub mod enrollment_importer;
pub mod error;
pub mod file_parser;

// 重导出核心类型
pub use enrollment_importer::{EnrollmentImporter, ImportReport, RosterKind, RowIssue};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};

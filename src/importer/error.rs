// ==========================================
// 毕业论文管理系统 - 名册导入错误
// ==========================================
// 只描述整份文件失败的情况; 单行问题记入 ImportReport, 不中断导入
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("不支持的名册格式: .{0} (支持 .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("名册文件无法读取: {0}")]
    Unreadable(String),

    #[error("{format} 名册解析失败: {message}")]
    Malformed { format: &'static str, message: String },

    #[error("工作簿没有可用的工作表")]
    EmptyWorkbook,

    #[error("名册缺少必需列: {0}")]
    MissingColumn(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::Unreadable(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => ImportError::Unreadable(err.to_string()),
            _ => ImportError::Malformed {
                format: "CSV",
                message: err.to_string(),
            },
        }
    }
}

impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::Malformed {
            format: "Excel",
            message: err.to_string(),
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

// ==========================================
// 毕业论文管理系统 - API层错误类型
// ==========================================
// 职责: 把引擎/仓储错误收敛为对外的错误分类
// 可解释性: 所有错误信息必须包含显式原因
// ==========================================

use crate::engine::assignment::AssignmentRejection;
use crate::engine::error::{EngineError, ErrorCategory};
use crate::engine::schedule::ScheduleRejection;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入与业务规则
    // ==========================================
    #[error("数据验证失败: {0}")]
    ValidationError(String),

    /// 版本过期 / 时间冲突
    #[error("冲突: {message}")]
    ConflictError {
        code: &'static str,
        message: String,
        conflicting_session_id: Option<String>,
        retryable: bool,
    },

    #[error("容量不足: {0}")]
    CapacityError(String),

    #[error("业务规则违反 [{code}]: {message}")]
    RuleViolation { code: &'static str, message: String },

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 缺陷 / 基础设施
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::ValidationError(_) => ErrorCategory::ValidationError,
            ApiError::ConflictError { .. } => ErrorCategory::ConflictError,
            ApiError::CapacityError(_) => ErrorCategory::CapacityError,
            ApiError::RuleViolation { .. } => ErrorCategory::RuleViolation,
            ApiError::NotFound(_) => ErrorCategory::NotFound,
            ApiError::DatabaseError(_) => ErrorCategory::DatabaseError,
            ApiError::InternalError(_) => ErrorCategory::InternalError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::ValidationError(_) => "VALIDATION_FAILED",
            ApiError::ConflictError { code, .. } => *code,
            ApiError::CapacityError(_) => "CAPACITY_EXCEEDED",
            ApiError::RuleViolation { code, .. } => *code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::DatabaseError(_) => "STORAGE_FAILURE",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::ConflictError { retryable: true, .. })
    }

    /// 序列化给调用方的错误体
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            category: self.category(),
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// 对外错误体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = err.code();
        let retryable = err.is_retryable();
        match err {
            EngineError::Validation(msg) => ApiError::ValidationError(msg),
            EngineError::Schedule(ScheduleRejection::InvalidWindow(msg)) => ApiError::ValidationError(msg),
            EngineError::Schedule(ScheduleRejection::TimeConflict { session_id, reason }) => ApiError::ConflictError {
                code,
                message: format!("与会话 {} 冲突: {}", session_id, reason),
                conflicting_session_id: Some(session_id),
                retryable,
            },
            e @ EngineError::VersionConflict { .. } => ApiError::ConflictError {
                code,
                message: format!("{}, 请刷新后重试", e),
                conflicting_session_id: None,
                retryable,
            },
            EngineError::Assignment(rejection @ AssignmentRejection::CapacityExceeded { .. }) => {
                ApiError::CapacityError(rejection.to_string())
            }
            EngineError::NotFound { entity, id } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
            EngineError::Storage(repo) => ApiError::from(repo),
            EngineError::Integrity(msg) => ApiError::InternalError(format!("数据完整性破坏: {}", msg)),
            other => match other.category() {
                ErrorCategory::ValidationError => ApiError::ValidationError(other.to_string()),
                ErrorCategory::InternalError => ApiError::InternalError(other.to_string()),
                _ => ApiError::RuleViolation {
                    code,
                    message: other.to_string(),
                },
            },
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::ConflictError {
                code: "STALE_VERSION",
                message: format!(
                    "{}(id={})已被其他用户修改（期望version={}，实际version={}），请刷新后重试",
                    entity, id, expected, actual
                ),
                conflicting_session_id: None,
                retryable: true,
            },
            RepositoryError::NotFound { entity, id } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
            RepositoryError::UniqueConstraintViolation(msg) => ApiError::RuleViolation {
                code: "DUPLICATE_KEY",
                message: format!("唯一约束违反: {}", msg),
            },
            RepositoryError::ForeignKeyViolation(msg) => ApiError::RuleViolation {
                code: "REFERENCE_MISSING",
                message: format!("外键约束违反: {}", msg),
            },
            RepositoryError::SerializationError { field, message } => {
                ApiError::ValidationError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::IntegrityViolation(msg) => ApiError::InternalError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::InternalError(err.to_string()),
            RepositoryError::DatabaseConnectionError(msg)
            | RepositoryError::LockError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(repo) => ApiError::from(repo),
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件不存在: {}", path)),
            other => ApiError::ValidationError(format!("文件导入失败: {}", other)),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ThesisState;

    #[test]
    fn test_time_conflict_maps_to_conflict_error() {
        let err: ApiError = EngineError::Schedule(ScheduleRejection::TimeConflict {
            session_id: "S1".to_string(),
            reason: "地点 ROOM:301 已被占用".to_string(),
        })
        .into();
        let resp = err.to_response();
        assert_eq!(resp.category, ErrorCategory::ConflictError);
        assert_eq!(resp.code, "TIME_CONFLICT");
        assert!(!resp.retryable, "时间冲突不可直接重试");
        match err {
            ApiError::ConflictError {
                conflicting_session_id, ..
            } => assert_eq!(conflicting_session_id.as_deref(), Some("S1")),
            _ => panic!("Expected ConflictError"),
        }
    }

    #[test]
    fn test_stale_version_is_only_retryable_error() {
        let err: ApiError = EngineError::VersionConflict {
            entity: "ThesisRecord".to_string(),
            id: "T1".to_string(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "STALE_VERSION");

        let repo: ApiError = RepositoryError::OptimisticLockFailure {
            entity: "Lecturer".to_string(),
            id: "L1".to_string(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(repo.is_retryable());
    }

    #[test]
    fn test_capacity_and_rule_mapping() {
        let capacity: ApiError = EngineError::Assignment(AssignmentRejection::CapacityExceeded {
            lecturer_id: "L1".to_string(),
            active_load: 8,
            capacity_limit: 8,
        })
        .into();
        assert_eq!(capacity.category(), ErrorCategory::CapacityError);

        let transition: ApiError = EngineError::InvalidTransition {
            from: ThesisState::Draft,
            to: ThesisState::Approved,
        }
        .into();
        match transition {
            ApiError::RuleViolation { code, .. } => assert_eq!(code, "INVALID_TRANSITION"),
            _ => panic!("Expected RuleViolation"),
        }
    }

    #[test]
    fn test_not_found_mapping() {
        let err: ApiError = RepositoryError::not_found("Student", "S404").into();
        let resp = err.to_response();
        assert_eq!(resp.category, ErrorCategory::NotFound);
        assert!(resp.message.contains("S404"));
    }
}

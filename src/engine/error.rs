// ==========================================
// 毕业论文管理系统 - 引擎层错误类型
// ==========================================
// 分层: RepositoryError (存储) → EngineError (领域) → ApiError (接口)
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::ThesisState;
use crate::engine::aggregation::AggregationError;
use crate::engine::assignment::AssignmentRejection;
use crate::engine::schedule::ScheduleRejection;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// ErrorCategory - 对外错误分类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    ValidationError,
    ConflictError,
    CapacityError,
    RuleViolation,
    NotFound,
    DatabaseError,
    InternalError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::ValidationError => "VALIDATION_ERROR",
            ErrorCategory::ConflictError => "CONFLICT_ERROR",
            ErrorCategory::CapacityError => "CAPACITY_ERROR",
            ErrorCategory::RuleViolation => "RULE_VIOLATION",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::DatabaseError => "DATABASE_ERROR",
            ErrorCategory::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 输入错误 =====
    #[error("输入校验失败: {0}")]
    Validation(String),

    // ===== 并发控制 =====
    #[error("版本冲突: {entity}(id={id}), expected_version={expected}, actual_version={actual}")]
    VersionConflict {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    // ===== 解析器拒绝 =====
    #[error(transparent)]
    Assignment(#[from] AssignmentRejection),

    #[error(transparent)]
    Schedule(#[from] ScheduleRejection),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    // ===== 业务规则 =====
    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: ThesisState, to: ThesisState },

    #[error("前置条件不满足: {0}")]
    PreconditionNotMet(String),

    #[error("角色无权执行该操作: {0}")]
    RoleNotPermitted(String),

    #[error("评分已提交: thesis_id={thesis_id}, rater_id={rater_id}, attempt={attempt_no}")]
    DuplicateEvaluation {
        thesis_id: String,
        rater_id: String,
        attempt_no: i32,
    },

    #[error("修改次数已达上限: thesis_id={thesis_id}, max={max}")]
    RevisionLimitExceeded { thesis_id: String, max: i32 },

    // ===== 数据访问 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// 存储内容自相矛盾 (程序缺陷)
    #[error("数据完整性破坏: {0}")]
    Integrity(String),

    #[error(transparent)]
    Storage(RepositoryError),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// 对外错误分类
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Validation(_) => ErrorCategory::ValidationError,
            EngineError::VersionConflict { .. } => ErrorCategory::ConflictError,
            EngineError::Assignment(rejection) => match rejection {
                AssignmentRejection::CapacityExceeded { .. } => ErrorCategory::CapacityError,
                _ => ErrorCategory::RuleViolation,
            },
            EngineError::Schedule(rejection) => match rejection {
                ScheduleRejection::TimeConflict { .. } => ErrorCategory::ConflictError,
                ScheduleRejection::InvalidWindow(_) => ErrorCategory::ValidationError,
            },
            EngineError::Aggregation(err) => match err {
                AggregationError::ScoreOutOfRange { .. }
                | AggregationError::EmptyRubric { .. }
                | AggregationError::RubricMismatch { .. } => ErrorCategory::ValidationError,
                AggregationError::InvalidWeights { .. } => ErrorCategory::InternalError,
                _ => ErrorCategory::RuleViolation,
            },
            EngineError::InvalidTransition { .. }
            | EngineError::PreconditionNotMet(_)
            | EngineError::RoleNotPermitted(_)
            | EngineError::DuplicateEvaluation { .. }
            | EngineError::RevisionLimitExceeded { .. } => ErrorCategory::RuleViolation,
            EngineError::NotFound { .. } => ErrorCategory::NotFound,
            EngineError::Integrity(_) => ErrorCategory::InternalError,
            EngineError::Storage(_) => ErrorCategory::DatabaseError,
        }
    }

    /// 稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_FAILED",
            EngineError::VersionConflict { .. } => "STALE_VERSION",
            EngineError::Assignment(rejection) => match rejection {
                AssignmentRejection::CapabilityMismatch { .. } => "CAPABILITY_MISMATCH",
                AssignmentRejection::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
                AssignmentRejection::DuplicateAssignment { .. } => "DUPLICATE_ASSIGNMENT",
                AssignmentRejection::ConflictOfInterest { .. } => "CONFLICT_OF_INTEREST",
            },
            EngineError::Schedule(rejection) => match rejection {
                ScheduleRejection::TimeConflict { .. } => "TIME_CONFLICT",
                ScheduleRejection::InvalidWindow(_) => "INVALID_WINDOW",
            },
            EngineError::Aggregation(err) => match err {
                AggregationError::IncompleteEvaluations { .. } => "INCOMPLETE_EVALUATIONS",
                AggregationError::UnexpectedRater { .. } => "UNEXPECTED_RATER",
                AggregationError::DuplicateRater { .. } => "DUPLICATE_RATER",
                AggregationError::AttemptMismatch { .. } => "ATTEMPT_MISMATCH",
                AggregationError::EmptyRubric { .. } => "EMPTY_RUBRIC",
                AggregationError::ScoreOutOfRange { .. } => "SCORE_OUT_OF_RANGE",
                AggregationError::RubricMismatch { .. } => "RUBRIC_MISMATCH",
                AggregationError::EmptyPanel => "EMPTY_PANEL",
                AggregationError::InvalidWeights { .. } => "INVALID_WEIGHTS",
            },
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::PreconditionNotMet(_) => "PRECONDITION_NOT_MET",
            EngineError::RoleNotPermitted(_) => "ROLE_NOT_PERMITTED",
            EngineError::DuplicateEvaluation { .. } => "DUPLICATE_EVALUATION",
            EngineError::RevisionLimitExceeded { .. } => "REVISION_LIMIT_EXCEEDED",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Integrity(_) => "INTEGRITY_VIOLATION",
            EngineError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// 只有版本冲突可由调用方重读后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::VersionConflict { .. })
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => EngineError::VersionConflict {
                entity,
                id,
                expected,
                actual,
            },
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            RepositoryError::IntegrityViolation(msg) => EngineError::Integrity(msg),
            other => EngineError::Storage(other),
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

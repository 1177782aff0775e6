// ==========================================
// 毕业论文管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、状态迁移表
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod evaluation;
pub mod lecturer;
pub mod session;
pub mod student;
pub mod thesis;
pub mod transition_log;
pub mod types;

// 重导出核心类型
pub use evaluation::{Evaluation, MAX_RUBRIC_SCORE, MIN_RUBRIC_SCORE};
pub use lecturer::{normalize_tags, Lecturer};
pub use session::{Location, Session};
pub use student::Student;
pub use thesis::{DefenseOutcome, FinalGrade, ThesisRecord, MAX_EXAMINERS, MAX_TITLE_CHARS};
pub use transition_log::TransitionLog;
pub use types::{
    Actor, ActorRole, Capability, GradeBand, RaterRole, SessionKind, SessionStatus, ThesisState,
};

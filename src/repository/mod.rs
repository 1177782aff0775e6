// ==========================================
// 毕业论文管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 所有更新带 version 条件 (乐观锁)
// ==========================================

pub mod entity_store;
pub mod error;
pub mod evaluation_repo;
pub mod lecturer_repo;
pub mod session_repo;
pub mod student_repo;
pub mod thesis_repo;
pub mod transition_log_repo;
mod versioning;

// 重导出核心仓储
pub use entity_store::EntityStore;
pub use error::{RepositoryError, RepositoryResult};
pub use evaluation_repo::EvaluationRepository;
pub use lecturer_repo::LecturerRepository;
pub use session_repo::SessionRepository;
pub use student_repo::StudentRepository;
pub use thesis_repo::{ThesisFilter, ThesisRepository};
pub use transition_log_repo::TransitionLogRepository;

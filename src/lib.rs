// ==========================================
// 毕业论文管理系统 - 核心库
// ==========================================
// 核心: 论文生命周期状态机 + 角色分配 + 会话排期 + 成绩汇总
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 名册导入
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Actor, ActorRole, Capability, GradeBand, RaterRole, SessionKind, SessionStatus, ThesisState};

// 领域实体
pub use domain::{
    DefenseOutcome, Evaluation, FinalGrade, Lecturer, Location, Session, Student, ThesisRecord, TransitionLog,
};

// 引擎
pub use engine::{
    AssignmentResolver, Clock, EngineError, EvaluationAggregator, FixedClock, ScheduleResolver, SystemClock,
    WorkflowEngine,
};

// API
pub use api::{ApiError, DirectoryApi, ErrorResponse, QueryApi, ThesisApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "毕业论文管理系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

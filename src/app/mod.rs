// ==========================================
// 毕业论文管理系统 - 应用层
// ==========================================
// 职责: 组件装配, 供 CLI 与集成方使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};

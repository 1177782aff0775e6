// ==========================================
// 毕业论文管理系统 - 配置层
// ==========================================
// 职责: 院系级配置 (修改次数上限、评分权重、默认负载上限)
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod grading_profile;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, WorkflowSettings};
pub use grading_profile::GradingWeights;

// ==========================================
// 毕业论文管理系统 - 状态迁移日志
// ==========================================
// 红线: 每次状态迁移必须记录且只归属一个操作人角色
// 用途: 审计追踪, 状态路径校验
// ==========================================

use crate::domain::types::{ActorRole, ThesisState};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// TransitionLog - 状态迁移日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLog {
    pub log_id: String,                  // 日志ID
    pub thesis_id: String,               // 关联论文
    pub from_state: Option<ThesisState>, // 迁移前状态 (创建时为None)
    pub to_state: ThesisState,           // 迁移后状态
    pub actor_id: String,                // 操作人
    pub actor_role: ActorRole,           // 操作人角色
    pub occurred_at: NaiveDateTime,      // 发生时间
    pub version_after: i64,              // 迁移后的论文版本号
    pub detail: Option<String>,          // 附加说明 (驳回原因/成绩等)
}

// ==========================================
// 毕业论文管理系统 - 领域类型定义
// ==========================================
// 依据: 论文生命周期状态机 (4.2)
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 论文状态 (Thesis State)
// ==========================================
// 红线: 所有状态迁移只能经过 can_transition_to 这一张表
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThesisState {
    Draft,              // 草稿
    Submitted,          // 已提交题目
    UnderReview,        // 题目审核中
    Approved,           // 题目通过
    Rejected,           // 题目驳回 (终态)
    SupervisorAssigned, // 已分配导师
    InSupervision,      // 指导中
    ExaminersAssigned,  // 已分配答辩评委
    DefenseScheduled,   // 答辩已排期
    Defended,           // 已答辩,待评分
    Passed,             // 通过
    RevisionRequired,   // 需修改
    Failed,             // 未通过 (终态)
    Finalized,          // 成绩已确认
    Archived,           // 已归档 (终态)
}

impl ThesisState {
    /// 全部状态 (按生命周期顺序)
    pub const ALL: [ThesisState; 15] = [
        ThesisState::Draft,
        ThesisState::Submitted,
        ThesisState::UnderReview,
        ThesisState::Approved,
        ThesisState::Rejected,
        ThesisState::SupervisorAssigned,
        ThesisState::InSupervision,
        ThesisState::ExaminersAssigned,
        ThesisState::DefenseScheduled,
        ThesisState::Defended,
        ThesisState::Passed,
        ThesisState::RevisionRequired,
        ThesisState::Failed,
        ThesisState::Finalized,
        ThesisState::Archived,
    ];

    /// 状态迁移表
    ///
    /// 唯一的合法边集合; 引擎层所有迁移都先经过此判断
    pub fn can_transition_to(self, next: ThesisState) -> bool {
        use ThesisState::*;
        match self {
            Draft => matches!(next, Submitted),
            Submitted => matches!(next, UnderReview),
            UnderReview => matches!(next, Approved | Rejected),
            Approved => matches!(next, SupervisorAssigned),
            SupervisorAssigned => matches!(next, InSupervision),
            InSupervision => matches!(next, ExaminersAssigned),
            ExaminersAssigned => matches!(next, DefenseScheduled),
            // 答辩取消时退回 ExaminersAssigned 以便重新排期
            DefenseScheduled => matches!(next, Defended | ExaminersAssigned),
            Defended => matches!(next, Passed | RevisionRequired | Failed),
            RevisionRequired => matches!(next, InSupervision | Failed),
            Passed => matches!(next, Finalized),
            Finalized => matches!(next, Archived),
            Rejected | Failed | Archived => false,
        }
    }

    /// 是否终态 (不再有出边)
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ThesisState::Rejected | ThesisState::Failed | ThesisState::Archived
        )
    }

    /// 是否仍在进行中 (非终态且未确认成绩)
    pub fn is_in_progress(self) -> bool {
        !self.is_terminal() && self != ThesisState::Finalized
    }

    /// 是否占用导师/评委负载
    ///
    /// 负载在 Finalized / Failed 时释放
    pub fn holds_lecturer_load(self) -> bool {
        matches!(
            self,
            ThesisState::SupervisorAssigned
                | ThesisState::InSupervision
                | ThesisState::ExaminersAssigned
                | ThesisState::DefenseScheduled
                | ThesisState::Defended
                | ThesisState::Passed
                | ThesisState::RevisionRequired
        )
    }

    /// 从字符串解析状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(ThesisState::Draft),
            "SUBMITTED" => Some(ThesisState::Submitted),
            "UNDER_REVIEW" => Some(ThesisState::UnderReview),
            "APPROVED" => Some(ThesisState::Approved),
            "REJECTED" => Some(ThesisState::Rejected),
            "SUPERVISOR_ASSIGNED" => Some(ThesisState::SupervisorAssigned),
            "IN_SUPERVISION" => Some(ThesisState::InSupervision),
            "EXAMINERS_ASSIGNED" => Some(ThesisState::ExaminersAssigned),
            "DEFENSE_SCHEDULED" => Some(ThesisState::DefenseScheduled),
            "DEFENDED" => Some(ThesisState::Defended),
            "PASSED" => Some(ThesisState::Passed),
            "REVISION_REQUIRED" => Some(ThesisState::RevisionRequired),
            "FAILED" => Some(ThesisState::Failed),
            "FINALIZED" => Some(ThesisState::Finalized),
            "ARCHIVED" => Some(ThesisState::Archived),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ThesisState::Draft => "DRAFT",
            ThesisState::Submitted => "SUBMITTED",
            ThesisState::UnderReview => "UNDER_REVIEW",
            ThesisState::Approved => "APPROVED",
            ThesisState::Rejected => "REJECTED",
            ThesisState::SupervisorAssigned => "SUPERVISOR_ASSIGNED",
            ThesisState::InSupervision => "IN_SUPERVISION",
            ThesisState::ExaminersAssigned => "EXAMINERS_ASSIGNED",
            ThesisState::DefenseScheduled => "DEFENSE_SCHEDULED",
            ThesisState::Defended => "DEFENDED",
            ThesisState::Passed => "PASSED",
            ThesisState::RevisionRequired => "REVISION_REQUIRED",
            ThesisState::Failed => "FAILED",
            ThesisState::Finalized => "FINALIZED",
            ThesisState::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for ThesisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 教师能力 (Lecturer Capability)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Supervisor, // 可担任导师
    Examiner,   // 可担任答辩评委
}

impl Capability {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SUPERVISOR" => Some(Capability::Supervisor),
            "EXAMINER" => Some(Capability::Examiner),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            Capability::Supervisor => "SUPERVISOR",
            Capability::Examiner => "EXAMINER",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 操作人角色 (Actor Role)
// ==========================================
// 仅做角色标记,不做认证
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Admin,      // 教务管理员
    Supervisor, // 导师
    Examiner,   // 评委
    Student,    // 学生
    System,     // 系统自动
}

impl ActorRole {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ADMIN" => Some(ActorRole::Admin),
            "SUPERVISOR" => Some(ActorRole::Supervisor),
            "EXAMINER" => Some(ActorRole::Examiner),
            "STUDENT" => Some(ActorRole::Student),
            "SYSTEM" => Some(ActorRole::System),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "ADMIN",
            ActorRole::Supervisor => "SUPERVISOR",
            ActorRole::Examiner => "EXAMINER",
            ActorRole::Student => "STUDENT",
            ActorRole::System => "SYSTEM",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// Actor - 命令发起人
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: String, // 操作人ID (学生/教师ID 或 管理员账号)
    pub role: ActorRole,  // 角色标记
}

impl Actor {
    pub fn new(actor_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }

    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, ActorRole::Admin)
    }

    pub fn system() -> Self {
        Self::new("system", ActorRole::System)
    }
}

// ==========================================
// 会话类型 (Session Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    Supervision, // 指导
    Defense,     // 答辩
}

impl SessionKind {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SUPERVISION" => Some(SessionKind::Supervision),
            "DEFENSE" => Some(SessionKind::Defense),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SessionKind::Supervision => "SUPERVISION",
            SessionKind::Defense => "DEFENSE",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 会话状态 (Session Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled, // 已排期
    Completed, // 已完成
    Cancelled, // 已取消
}

impl SessionStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SCHEDULED" => Some(SessionStatus::Scheduled),
            "COMPLETED" => Some(SessionStatus::Completed),
            "CANCELLED" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 评分人角色 (Rater Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaterRole {
    Supervisor, // 导师评分 (指导成绩)
    Examiner,   // 评委评分 (答辩成绩)
}

impl RaterRole {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SUPERVISOR" => Some(RaterRole::Supervisor),
            "EXAMINER" => Some(RaterRole::Examiner),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            RaterRole::Supervisor => "SUPERVISOR",
            RaterRole::Examiner => "EXAMINER",
        }
    }
}

impl fmt::Display for RaterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 成绩档位 (Grade Band)
// ==========================================
// 顺序: Failed < RevisionRequired < Passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeBand {
    Failed,           // <45
    RevisionRequired, // 45-59
    Passed,           // >=60
}

impl GradeBand {
    /// 档位对应的论文后继状态
    pub fn next_state(self) -> ThesisState {
        match self {
            GradeBand::Passed => ThesisState::Passed,
            GradeBand::RevisionRequired => ThesisState::RevisionRequired,
            GradeBand::Failed => ThesisState::Failed,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            GradeBand::Failed => "FAILED",
            GradeBand::RevisionRequired => "REVISION_REQUIRED",
            GradeBand::Passed => "PASSED",
        }
    }
}

impl fmt::Display for GradeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

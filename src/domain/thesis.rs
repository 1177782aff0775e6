// ==========================================
// 毕业论文管理系统 - 论文领域模型
// ==========================================
// 红线: 状态字段只允许 WorkflowEngine 修改
// 红线: 导师不在评委中, 评委两两不同
// ==========================================

use crate::domain::types::{GradeBand, ThesisState};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 题目最大长度 (字符)
pub const MAX_TITLE_CHARS: usize = 255;

/// 评委人数上限
pub const MAX_EXAMINERS: usize = 2;

// ==========================================
// DefenseOutcome - 答辩评分汇总结果
// ==========================================
// 由 EvaluationAggregator 计算,每轮答辩覆盖一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseOutcome {
    pub attempt_no: i32,       // 答辩轮次
    pub supervisor_score: f64, // 导师角色得分 (未加权)
    pub examiner_score: f64,   // 评委组得分 (未加权)
    pub raw_score: f64,        // 加权后未取整分
    pub final_score: i32,      // 四舍五入后的最终分
    pub band: GradeBand,       // 档位
    pub distinction: bool,     // 优秀标记 (>=90)
}

// ==========================================
// FinalGrade - 最终成绩
// ==========================================
// 只在 Finalized / Failed 时写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalGrade {
    pub score: i32,
    pub band: GradeBand,
    pub distinction: bool,
    pub attempt_no: i32,
    pub graded_at: NaiveDateTime,
}

impl FinalGrade {
    pub fn from_outcome(outcome: &DefenseOutcome, graded_at: NaiveDateTime) -> Self {
        Self {
            score: outcome.final_score,
            band: outcome.band,
            distinction: outcome.distinction,
            attempt_no: outcome.attempt_no,
            graded_at,
        }
    }
}

// ==========================================
// ThesisRecord - 论文记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThesisRecord {
    // ===== 主键与归属 =====
    pub thesis_id: String,  // 生成ID
    pub student_id: String, // 所属学生

    // ===== 题目 =====
    pub title: String,
    pub abstract_text: String,
    pub rejection_reason: Option<String>, // 题目驳回原因

    // ===== 角色分配 =====
    pub supervisor_id: Option<String>, // 导师 (0..1)
    pub examiner_ids: Vec<String>,     // 评委 (0..2, 有序)

    // ===== 生命周期 =====
    pub state: ThesisState,
    pub revision_count: i32,               // 已修改次数 (= 当前答辩轮次)
    pub supervisor_sign_off: bool,         // 导师同意答辩
    pub defense_session_id: Option<String>, // 当前答辩会话
    pub last_outcome: Option<DefenseOutcome>,
    pub final_grade: Option<FinalGrade>,

    // ===== 元数据 =====
    pub archived: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub version: i64,
}

impl ThesisRecord {
    /// 创建草稿 (生成ID, version=1)
    pub fn new_draft(
        student_id: impl Into<String>,
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            thesis_id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.into(),
            title: title.into(),
            abstract_text: abstract_text.into(),
            rejection_reason: None,
            supervisor_id: None,
            examiner_ids: Vec::new(),
            state: ThesisState::Draft,
            revision_count: 0,
            supervisor_sign_off: false,
            defense_session_id: None,
            last_outcome: None,
            final_grade: None,
            archived: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// 该教师是否已在本论文中担任任一角色
    pub fn involves_lecturer(&self, lecturer_id: &str) -> bool {
        self.supervisor_id.as_deref() == Some(lecturer_id)
            || self.examiner_ids.iter().any(|e| e == lecturer_id)
    }

    /// 当前占用负载的所有教师 (导师在前)
    pub fn assigned_lecturers(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(1 + self.examiner_ids.len());
        if let Some(sup) = &self.supervisor_id {
            ids.push(sup.clone());
        }
        for e in &self.examiner_ids {
            if !ids.contains(e) {
                ids.push(e.clone());
            }
        }
        ids
    }

    /// 当前答辩轮次
    pub fn current_attempt(&self) -> i32 {
        self.revision_count
    }
}

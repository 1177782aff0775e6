// ==========================================
// 毕业论文管理系统 - 评分领域模型
// ==========================================
// 红线: 每位评分人每次答辩 (attempt) 至多一份评分
// ==========================================

use crate::domain::types::RaterRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单项评分的合法区间
pub const MIN_RUBRIC_SCORE: i32 = 0;
pub const MAX_RUBRIC_SCORE: i32 = 100;

// ==========================================
// Evaluation - 评分
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation_id: String,                // 生成ID
    pub thesis_id: String,                    // 所属论文
    pub rater_id: String,                     // 评分教师
    pub rater_role: RaterRole,                // 评分角色
    pub attempt_no: i32,                      // 答辩轮次 (= 论文修改次数)
    pub rubric_scores: BTreeMap<String, i32>, // 评分项 -> 0..100
    pub remarks: Option<String>,              // 评语
    pub submitted_at: NaiveDateTime,          // 提交时间
    pub archived: bool,                       // 软删除标记
    pub updated_at: NaiveDateTime,            // 更新时间
    pub version: i64,                         // 乐观锁版本号
}

impl Evaluation {
    /// 平均分 (未取整)
    pub fn mean_score(&self) -> Option<f64> {
        if self.rubric_scores.is_empty() {
            return None;
        }
        let sum: i64 = self.rubric_scores.values().map(|v| *v as i64).sum();
        Some(sum as f64 / self.rubric_scores.len() as f64)
    }
}

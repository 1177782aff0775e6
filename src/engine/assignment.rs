// ==========================================
// 毕业论文管理系统 - 导师/评委分配解析器
// ==========================================
// 红线: 导师不得兼任评委; 评委两两不同
// 红线: 任何教师已提交的 active_load 不得超过 capacity_limit
// ==========================================
// 校验顺序 (命中即返回):
// (a) 候选人存在、未归档、具备所需能力
// (b) 新分配教师 active_load < capacity_limit
// (c) 评委列表无重复
// (d) 评委不是本论文导师
// 失败时不写入任何数据; 成功时在调用方事务内应用
// ==========================================

use crate::domain::lecturer::Lecturer;
use crate::domain::thesis::{ThesisRecord, MAX_EXAMINERS};
use crate::domain::types::Capability;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::lecturer_repo::LecturerRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, instrument};

// ==========================================
// AssignmentRejection - 分配拒绝原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentRejection {
    #[error("教师不具备所需能力或已归档: lecturer_id={lecturer_id}, required={required}")]
    CapabilityMismatch {
        lecturer_id: String,
        required: Capability,
    },

    #[error("教师负载已满: lecturer_id={lecturer_id}, active_load={active_load}, capacity_limit={capacity_limit}")]
    CapacityExceeded {
        lecturer_id: String,
        active_load: i32,
        capacity_limit: i32,
    },

    #[error("评委重复分配: lecturer_id={lecturer_id}")]
    DuplicateAssignment { lecturer_id: String },

    #[error("利益冲突, 导师不得兼任评委: lecturer_id={lecturer_id}")]
    ConflictOfInterest { lecturer_id: String },
}

// ==========================================
// AssignmentPlan - 校验通过后的分配方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPlan {
    pub supervisor_id: String,
    pub examiner_ids: Vec<String>,
    pub newly_assigned: Vec<String>, // 负载 +1
    pub released: Vec<String>,       // 负载 -1 (修改后重新分配评委时被替换者)
}

/// 分配规则校验 (纯函数, 无 I/O)
///
/// # 参数
/// - `thesis`: 当前论文 (用于判定哪些教师是新分配)
/// - `supervisor`: 导师 (新分配或已在任)
/// - `examiners`: 评委候选 (仅导师分配时为空)
pub fn check(
    thesis: &ThesisRecord,
    supervisor: &Lecturer,
    examiners: &[Lecturer],
) -> Result<AssignmentPlan, AssignmentRejection> {
    let current = thesis.assigned_lecturers();
    let supervisor_is_new = thesis.supervisor_id.as_deref() != Some(supervisor.lecturer_id.as_str());

    // (a) 能力
    if supervisor_is_new {
        ensure_capability(supervisor, Capability::Supervisor)?;
    }
    for examiner in examiners {
        if !thesis.examiner_ids.contains(&examiner.lecturer_id) {
            ensure_capability(examiner, Capability::Examiner)?;
        }
    }

    // (b) 负载 (同一教师只计一次)
    let mut newly_assigned: Vec<String> = Vec::new();
    let candidates = std::iter::once(supervisor).filter(|_| supervisor_is_new).chain(examiners.iter());
    for lecturer in candidates {
        if current.contains(&lecturer.lecturer_id) || newly_assigned.contains(&lecturer.lecturer_id) {
            continue;
        }
        if !lecturer.has_spare_capacity() {
            return Err(AssignmentRejection::CapacityExceeded {
                lecturer_id: lecturer.lecturer_id.clone(),
                active_load: lecturer.active_load,
                capacity_limit: lecturer.capacity_limit,
            });
        }
        newly_assigned.push(lecturer.lecturer_id.clone());
    }

    // (c) 评委重复
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for examiner in examiners {
        if !seen.insert(examiner.lecturer_id.as_str()) {
            return Err(AssignmentRejection::DuplicateAssignment {
                lecturer_id: examiner.lecturer_id.clone(),
            });
        }
    }

    // (d) 利益冲突
    if let Some(examiner) = examiners.iter().find(|e| e.lecturer_id == supervisor.lecturer_id) {
        return Err(AssignmentRejection::ConflictOfInterest {
            lecturer_id: examiner.lecturer_id.clone(),
        });
    }

    let examiner_ids: Vec<String> = if examiners.is_empty() {
        thesis.examiner_ids.clone()
    } else {
        examiners.iter().map(|e| e.lecturer_id.clone()).collect()
    };
    let released: Vec<String> = thesis
        .examiner_ids
        .iter()
        .filter(|e| !examiners.is_empty() && !examiner_ids.contains(e))
        .cloned()
        .collect();

    Ok(AssignmentPlan {
        supervisor_id: supervisor.lecturer_id.clone(),
        examiner_ids,
        newly_assigned,
        released,
    })
}

fn ensure_capability(lecturer: &Lecturer, required: Capability) -> Result<(), AssignmentRejection> {
    if lecturer.archived || !lecturer.has_capability(required) {
        return Err(AssignmentRejection::CapabilityMismatch {
            lecturer_id: lecturer.lecturer_id.clone(),
            required,
        });
    }
    Ok(())
}

// ==========================================
// AssignmentResolver - 事务内加载/应用
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct AssignmentResolver;

impl AssignmentResolver {
    pub fn new() -> Self {
        Self
    }

    /// 在事务内加载候选人并校验
    #[instrument(skip(self, tx, thesis), fields(thesis_id = %thesis.thesis_id))]
    pub fn resolve_tx(
        &self,
        tx: &Connection,
        thesis: &ThesisRecord,
        supervisor_id: &str,
        examiner_ids: &[String],
    ) -> EngineResult<AssignmentPlan> {
        if examiner_ids.len() > MAX_EXAMINERS {
            return Err(EngineError::Validation(format!(
                "评委人数 {} 超过上限 {}",
                examiner_ids.len(),
                MAX_EXAMINERS
            )));
        }

        let supervisor = load_lecturer(tx, supervisor_id)?;
        let examiners = examiner_ids
            .iter()
            .map(|id| load_lecturer(tx, id))
            .collect::<EngineResult<Vec<Lecturer>>>()?;

        let plan = check(thesis, &supervisor, &examiners)?;
        debug!(
            newly_assigned = ?plan.newly_assigned,
            released = ?plan.released,
            "分配校验通过"
        );
        Ok(plan)
    }

    /// 在事务内应用方案: 调整教师负载并写入论文字段 (论文本身由调用方保存)
    pub fn apply_tx(
        &self,
        tx: &Connection,
        thesis: &mut ThesisRecord,
        plan: &AssignmentPlan,
        now: NaiveDateTime,
    ) -> EngineResult<()> {
        for lecturer_id in &plan.newly_assigned {
            adjust_load_tx(tx, lecturer_id, 1, now)?;
        }
        for lecturer_id in &plan.released {
            adjust_load_tx(tx, lecturer_id, -1, now)?;
        }
        thesis.supervisor_id = Some(plan.supervisor_id.clone());
        thesis.examiner_ids = plan.examiner_ids.clone();
        Ok(())
    }

    /// 释放论文占用的全部教师负载 (Finalized / Failed)
    pub fn release_all_tx(&self, tx: &Connection, thesis: &ThesisRecord, now: NaiveDateTime) -> EngineResult<()> {
        for lecturer_id in thesis.assigned_lecturers() {
            adjust_load_tx(tx, &lecturer_id, -1, now)?;
        }
        Ok(())
    }
}

fn load_lecturer(tx: &Connection, lecturer_id: &str) -> EngineResult<Lecturer> {
    LecturerRepository::find_by_id_tx(tx, lecturer_id)?
        .ok_or_else(|| EngineError::not_found("Lecturer", lecturer_id))
}

fn adjust_load_tx(tx: &Connection, lecturer_id: &str, delta: i32, now: NaiveDateTime) -> EngineResult<()> {
    let mut lecturer = LecturerRepository::find_by_id_tx(tx, lecturer_id)?.ok_or_else(|| {
        EngineError::Integrity(format!("论文引用的教师不存在: {}", lecturer_id))
    })?;

    let next = lecturer.active_load + delta;
    if next < 0 {
        return Err(EngineError::Integrity(format!(
            "教师 {} 负载将为负数 ({} + {})",
            lecturer_id, lecturer.active_load, delta
        )));
    }
    if delta > 0 && next > lecturer.capacity_limit {
        return Err(AssignmentRejection::CapacityExceeded {
            lecturer_id: lecturer_id.to_string(),
            active_load: lecturer.active_load,
            capacity_limit: lecturer.capacity_limit,
        }
        .into());
    }

    lecturer.active_load = next;
    lecturer.updated_at = now;
    LecturerRepository::update_tx(tx, &lecturer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn lecturer(id: &str, caps: &[Capability], limit: i32, load: i32) -> Lecturer {
        let mut l = Lecturer::new(format!("EMP-{}", id), id, caps.iter().copied().collect(), limit, now());
        l.lecturer_id = id.to_string();
        l.active_load = load;
        l
    }

    fn approved_thesis() -> ThesisRecord {
        ThesisRecord::new_draft("S1", "Sentiment Analysis", "", now())
    }

    fn with_supervisor(id: &str) -> ThesisRecord {
        let mut t = approved_thesis();
        t.supervisor_id = Some(id.to_string());
        t
    }

    #[test]
    fn test_supervisor_at_last_slot_is_accepted() {
        let sup = lecturer("S1", &[Capability::Supervisor], 8, 7);
        let plan = check(&approved_thesis(), &sup, &[]).unwrap();
        assert_eq!(plan.newly_assigned, vec!["S1"]);
        assert!(plan.examiner_ids.is_empty());
    }

    #[test]
    fn test_full_supervisor_rejected() {
        let sup = lecturer("S1", &[Capability::Supervisor], 8, 8);
        assert_eq!(
            check(&approved_thesis(), &sup, &[]),
            Err(AssignmentRejection::CapacityExceeded {
                lecturer_id: "S1".to_string(),
                active_load: 8,
                capacity_limit: 8
            })
        );
    }

    #[test]
    fn test_capability_checked_before_capacity() {
        let sup = lecturer("S1", &[Capability::Examiner], 8, 8);
        assert!(matches!(
            check(&approved_thesis(), &sup, &[]),
            Err(AssignmentRejection::CapabilityMismatch { .. })
        ));

        let mut archived = lecturer("S2", &[Capability::Supervisor], 8, 0);
        archived.archived = true;
        assert!(matches!(
            check(&approved_thesis(), &archived, &[]),
            Err(AssignmentRejection::CapabilityMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_examiner_rejected() {
        let thesis = with_supervisor("S1");
        let sup = lecturer("S1", &[Capability::Supervisor], 8, 1);
        let e = lecturer("E1", &[Capability::Examiner], 8, 0);
        assert_eq!(
            check(&thesis, &sup, &[e.clone(), e]),
            Err(AssignmentRejection::DuplicateAssignment {
                lecturer_id: "E1".to_string()
            })
        );
    }

    #[test]
    fn test_supervisor_as_examiner_is_conflict_of_interest() {
        let thesis = with_supervisor("S1");
        let sup = lecturer("S1", &[Capability::Supervisor, Capability::Examiner], 8, 1);
        let e = lecturer("E1", &[Capability::Examiner], 8, 0);
        assert_eq!(
            check(&thesis, &sup, &[e, sup.clone()]),
            Err(AssignmentRejection::ConflictOfInterest {
                lecturer_id: "S1".to_string()
            })
        );
    }

    #[test]
    fn test_reassignment_only_counts_newcomers() {
        let mut thesis = with_supervisor("S1");
        thesis.examiner_ids = vec!["E1".to_string(), "E2".to_string()];
        let sup = lecturer("S1", &[Capability::Supervisor], 8, 8);
        // E1 已在任, 即使负载已满也不受影响
        let e1 = lecturer("E1", &[Capability::Examiner], 3, 3);
        let e3 = lecturer("E3", &[Capability::Examiner], 3, 0);

        let plan = check(&thesis, &sup, &[e1, e3]).unwrap();
        assert_eq!(plan.newly_assigned, vec!["E3"]);
        assert_eq!(plan.released, vec!["E2"]);
        assert_eq!(plan.examiner_ids, vec!["E1", "E3"]);
    }
}

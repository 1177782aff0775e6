// ==========================================
// 毕业论文管理系统 - 论文命令 API
// ==========================================
// 职责: 参数校验 → WorkflowEngine → 错误收敛为 ApiError
// 红线: 不直接写库, 所有状态变化经过引擎
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::evaluation::Evaluation;
use crate::domain::thesis::ThesisRecord;
use crate::domain::types::{Actor, ThesisState};
use crate::engine::schedule::SessionRequest;
use crate::engine::workflow::{ReviewDecision, SessionBooking, WorkflowEngine};
use crate::repository::EntityStore;

// ==========================================
// ThesisApi - 论文命令 API
// ==========================================
pub struct ThesisApi {
    engine: Arc<WorkflowEngine>,
    store: Arc<EntityStore>,
}

impl ThesisApi {
    pub fn new(engine: Arc<WorkflowEngine>, store: Arc<EntityStore>) -> Self {
        Self { engine, store }
    }

    // ==========================================
    // 题目
    // ==========================================

    /// 新建并提交题目
    pub fn submit_title(
        &self,
        actor: &Actor,
        student_id: &str,
        title: &str,
        abstract_text: &str,
    ) -> ApiResult<ThesisRecord> {
        require_id("student_id", student_id)?;
        Ok(self.engine.submit_new_title(actor, student_id, title, abstract_text)?)
    }

    pub fn create_draft(
        &self,
        actor: &Actor,
        student_id: &str,
        title: &str,
        abstract_text: &str,
    ) -> ApiResult<ThesisRecord> {
        require_id("student_id", student_id)?;
        Ok(self.engine.create_draft(actor, student_id, title, abstract_text)?)
    }

    pub fn update_draft(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        title: &str,
        abstract_text: &str,
    ) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self
            .engine
            .update_draft(actor, thesis_id, expected_version, title, abstract_text)?)
    }

    /// 提交已有草稿
    pub fn submit_draft(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.submit_title(actor, thesis_id, expected_version)?)
    }

    pub fn start_review(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.start_review(actor, thesis_id, expected_version)?)
    }

    pub fn decide_title_review(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        decision: &ReviewDecision,
    ) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self
            .engine
            .decide_title_review(actor, thesis_id, expected_version, decision)?)
    }

    // ==========================================
    // 角色分配
    // ==========================================

    /// 按论文当前状态分派: Approved → 分配导师, 其余 → 分配评委
    ///
    /// # 参数
    /// - supervisor_id: Approved 时必填; 分配评委时若填写须与现任导师一致
    pub fn assign_roles(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        supervisor_id: Option<&str>,
        examiner_ids: &[String],
    ) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        let thesis = self
            .store
            .theses
            .find_by_id(thesis_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ThesisRecord(id={})不存在", thesis_id)))?;
        debug!(thesis_id, state = %thesis.state, "assign_roles 分派");

        if thesis.state == ThesisState::Approved {
            let supervisor_id = supervisor_id
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ApiError::ValidationError("分配导师时 supervisor_id 必填".to_string()))?;
            if !examiner_ids.is_empty() {
                return Err(ApiError::ValidationError(
                    "评委须在指导完成后分配, 本次不能同时指定".to_string(),
                ));
            }
            return Ok(self
                .engine
                .assign_supervisor(actor, thesis_id, expected_version, supervisor_id)?);
        }

        if let Some(requested) = supervisor_id {
            if thesis.supervisor_id.as_deref() != Some(requested) {
                return Err(ApiError::ValidationError(format!(
                    "论文状态 {} 下不能更换导师 (现任 {:?}, 请求 {})",
                    thesis.state, thesis.supervisor_id, requested
                )));
            }
        }
        Ok(self
            .engine
            .assign_examiners(actor, thesis_id, expected_version, examiner_ids)?)
    }

    // ==========================================
    // 指导 / 会话
    // ==========================================

    pub fn sign_off_supervision(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
    ) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.sign_off_supervision(actor, thesis_id, expected_version)?)
    }

    pub fn record_supervision_session(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        request: &SessionRequest,
    ) -> ApiResult<SessionBooking> {
        require_id("thesis_id", thesis_id)?;
        Ok(self
            .engine
            .record_supervision_session(actor, thesis_id, expected_version, request)?)
    }

    pub fn schedule_session(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        request: &SessionRequest,
    ) -> ApiResult<SessionBooking> {
        require_id("thesis_id", thesis_id)?;
        Ok(self
            .engine
            .schedule_session(actor, thesis_id, expected_version, request)?)
    }

    pub fn complete_session(
        &self,
        actor: &Actor,
        session_id: &str,
        expected_version: i64,
        notes: Option<String>,
    ) -> ApiResult<SessionBooking> {
        require_id("session_id", session_id)?;
        Ok(self
            .engine
            .complete_session(actor, session_id, expected_version, notes)?)
    }

    pub fn cancel_session(
        &self,
        actor: &Actor,
        session_id: &str,
        expected_version: i64,
        reason: Option<String>,
    ) -> ApiResult<SessionBooking> {
        require_id("session_id", session_id)?;
        Ok(self
            .engine
            .cancel_session(actor, session_id, expected_version, reason)?)
    }

    // ==========================================
    // 评分 / 结果
    // ==========================================

    pub fn submit_evaluation(
        &self,
        actor: &Actor,
        thesis_id: &str,
        rater_id: &str,
        rubric_scores: &BTreeMap<String, i32>,
        remarks: Option<String>,
    ) -> ApiResult<Evaluation> {
        require_id("thesis_id", thesis_id)?;
        require_id("rater_id", rater_id)?;
        Ok(self
            .engine
            .submit_evaluation(actor, thesis_id, rater_id, rubric_scores, remarks)?)
    }

    pub fn record_outcome(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.record_outcome(actor, thesis_id, expected_version)?)
    }

    pub fn begin_revision(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.begin_revision(actor, thesis_id, expected_version)?)
    }

    pub fn finalize(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.finalize(actor, thesis_id, expected_version)?)
    }

    pub fn archive(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> ApiResult<ThesisRecord> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.engine.archive(actor, thesis_id, expected_version)?)
    }
}

pub(crate) fn require_id(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{} 不能为空", field)));
    }
    Ok(())
}

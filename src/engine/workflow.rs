// ==========================================
// 毕业论文管理系统 - 论文生命周期引擎
// ==========================================
// 红线: 状态迁移只经过 ThesisState::can_transition_to
// 红线: 每个命令 = 一个 IMMEDIATE 事务 (读-校验-写), 失败整体回滚
// 红线: 每次状态迁移追加一条 TransitionLog, 归属唯一操作人角色
// ==========================================
// 校验顺序: 角色 → 版本 → 迁移边 → 输入 → 前置条件 → 解析器
// 幂等命令 (finalize / archive) 在版本校验之前返回当前状态
// ==========================================

use crate::config::{ConfigManager, WorkflowSettings};
use crate::domain::evaluation::Evaluation;
use crate::domain::session::Session;
use crate::domain::student::Student;
use crate::domain::thesis::{FinalGrade, ThesisRecord, MAX_EXAMINERS};
use crate::domain::transition_log::TransitionLog;
use crate::domain::types::{Actor, ActorRole, RaterRole, SessionKind, SessionStatus, ThesisState};
use crate::engine::aggregation::{validate_rubric, AggregationError, EvaluationAggregator, Panel};
use crate::engine::assignment::AssignmentResolver;
use crate::engine::clock::Clock;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::policy::{require_admin, require_owner_or_admin, require_supervisor_or_admin, validate_title};
use crate::engine::schedule::{ScheduleResolver, SessionRequest, WindowMode};
use crate::repository::error::RepositoryError;
use crate::repository::{
    EntityStore, EvaluationRepository, SessionRepository, StudentRepository, ThesisRepository,
    TransitionLogRepository,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

// ==========================================
// 命令载荷 / 返回值
// ==========================================

/// 题目审核结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

/// 会话命令结果 (会话 + 最新论文)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBooking {
    pub thesis: ThesisRecord,
    pub session: Session,
}

// ==========================================
// WorkflowEngine
// ==========================================
pub struct WorkflowEngine {
    store: Arc<EntityStore>,
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    assignment: AssignmentResolver,
    schedule: ScheduleResolver,
}

impl WorkflowEngine {
    pub fn new(store: Arc<EntityStore>, config: Arc<ConfigManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            assignment: AssignmentResolver::new(),
            schedule: ScheduleResolver::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ==========================================
    // 题目阶段
    // ==========================================

    /// 创建草稿 (– → Draft)
    #[instrument(skip(self, title, abstract_text), fields(actor = %actor.actor_id))]
    pub fn create_draft(
        &self,
        actor: &Actor,
        student_id: &str,
        title: &str,
        abstract_text: &str,
    ) -> EngineResult<ThesisRecord> {
        require_owner_or_admin(actor, student_id, "create_draft")?;
        validate_title(title, false)?;

        self.execute("create_draft", |tx, now| {
            self.insert_draft(tx, actor, student_id, title, abstract_text, now)
        })
    }

    /// 编辑草稿 (Draft, 不迁移)
    #[instrument(skip(self, title, abstract_text), fields(actor = %actor.actor_id))]
    pub fn update_draft(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        title: &str,
        abstract_text: &str,
    ) -> EngineResult<ThesisRecord> {
        validate_title(title, false)?;

        self.execute("update_draft", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            require_owner_or_admin(actor, &thesis.student_id, "update_draft")?;
            ensure_version(&thesis, expected_version)?;
            if thesis.state != ThesisState::Draft {
                return Err(EngineError::PreconditionNotMet(format!(
                    "只有草稿可编辑, 当前状态 {}",
                    thesis.state
                )));
            }

            thesis.title = title.trim().to_string();
            thesis.abstract_text = abstract_text.to_string();
            save(tx, &mut thesis, now)?;
            Ok(thesis)
        })
    }

    /// 提交题目 (Draft → Submitted)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn submit_title(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        self.execute("submit_title", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            require_owner_or_admin(actor, &thesis.student_id, "submit_title")?;
            ensure_version(&thesis, expected_version)?;
            ensure_edge(&thesis, ThesisState::Submitted)?;
            validate_title(&thesis.title, true)?;

            transition(tx, &mut thesis, ThesisState::Submitted, actor, None, now)?;
            Ok(thesis)
        })
    }

    /// 新建并提交题目 (– → Draft → Submitted, 单事务)
    #[instrument(skip(self, title, abstract_text), fields(actor = %actor.actor_id))]
    pub fn submit_new_title(
        &self,
        actor: &Actor,
        student_id: &str,
        title: &str,
        abstract_text: &str,
    ) -> EngineResult<ThesisRecord> {
        require_owner_or_admin(actor, student_id, "submit_title")?;
        validate_title(title, true)?;

        self.execute("submit_new_title", |tx, now| {
            let mut thesis = self.insert_draft(tx, actor, student_id, title, abstract_text, now)?;
            transition(tx, &mut thesis, ThesisState::Submitted, actor, None, now)?;
            Ok(thesis)
        })
    }

    /// 开始审核 (Submitted → UnderReview)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn start_review(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        require_admin(actor, "start_review")?;

        self.execute("start_review", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            ensure_version(&thesis, expected_version)?;
            transition(tx, &mut thesis, ThesisState::UnderReview, actor, None, now)?;
            Ok(thesis)
        })
    }

    /// 审核结论 (UnderReview → Approved | Rejected)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn decide_title_review(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        decision: &ReviewDecision,
    ) -> EngineResult<ThesisRecord> {
        require_admin(actor, "decide_title_review")?;
        if let ReviewDecision::Reject { reason } = decision {
            if reason.trim().is_empty() {
                return Err(EngineError::Validation("驳回必须填写原因".to_string()));
            }
        }

        self.execute("decide_title_review", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            ensure_version(&thesis, expected_version)?;

            match decision {
                ReviewDecision::Approve => {
                    ensure_edge(&thesis, ThesisState::Approved)?;
                    thesis.rejection_reason = None;
                    transition(tx, &mut thesis, ThesisState::Approved, actor, None, now)?;
                }
                ReviewDecision::Reject { reason } => {
                    ensure_edge(&thesis, ThesisState::Rejected)?;
                    let reason = reason.trim().to_string();
                    thesis.rejection_reason = Some(reason.clone());
                    transition(tx, &mut thesis, ThesisState::Rejected, actor, Some(reason), now)?;
                }
            }
            Ok(thesis)
        })
    }

    // ==========================================
    // 角色分配
    // ==========================================

    /// 分配导师 (Approved → SupervisorAssigned)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn assign_supervisor(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        supervisor_id: &str,
    ) -> EngineResult<ThesisRecord> {
        require_admin(actor, "assign_supervisor")?;

        self.execute("assign_supervisor", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            ensure_version(&thesis, expected_version)?;
            ensure_edge(&thesis, ThesisState::SupervisorAssigned)?;

            let plan = self.assignment.resolve_tx(tx, &thesis, supervisor_id, &[])?;
            self.assignment.apply_tx(tx, &mut thesis, &plan, now)?;
            transition(
                tx,
                &mut thesis,
                ThesisState::SupervisorAssigned,
                actor,
                Some(format!("supervisor={}", supervisor_id)),
                now,
            )?;
            Ok(thesis)
        })
    }

    /// 分配答辩评委 (InSupervision → ExaminersAssigned)
    ///
    /// 前置条件: 本轮已完成指导次数 >= min_completed_supervisions, 且导师已同意答辩
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn assign_examiners(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        examiner_ids: &[String],
    ) -> EngineResult<ThesisRecord> {
        require_admin(actor, "assign_examiners")?;
        if examiner_ids.is_empty() || examiner_ids.len() > MAX_EXAMINERS {
            return Err(EngineError::Validation(format!(
                "评委人数须为 1..={}, 实际 {}",
                MAX_EXAMINERS,
                examiner_ids.len()
            )));
        }
        let settings = self.settings()?;

        self.execute("assign_examiners", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            ensure_version(&thesis, expected_version)?;
            ensure_edge(&thesis, ThesisState::ExaminersAssigned)?;

            if !thesis.supervisor_sign_off {
                return Err(EngineError::PreconditionNotMet("导师尚未同意答辩".to_string()));
            }
            let completed =
                SessionRepository::count_completed_supervisions_tx(tx, &thesis.thesis_id, thesis.current_attempt())?;
            if completed < settings.min_completed_supervisions {
                return Err(EngineError::PreconditionNotMet(format!(
                    "本轮已完成指导 {} 次, 至少需要 {} 次",
                    completed, settings.min_completed_supervisions
                )));
            }

            let supervisor_id = thesis.supervisor_id.clone().ok_or_else(|| {
                EngineError::Integrity(format!("论文 {} 处于指导阶段但没有导师", thesis.thesis_id))
            })?;
            let plan = self.assignment.resolve_tx(tx, &thesis, &supervisor_id, examiner_ids)?;
            self.assignment.apply_tx(tx, &mut thesis, &plan, now)?;
            transition(
                tx,
                &mut thesis,
                ThesisState::ExaminersAssigned,
                actor,
                Some(format!("examiners={}", plan.examiner_ids.join(","))),
                now,
            )?;
            Ok(thesis)
        })
    }

    // ==========================================
    // 指导阶段
    // ==========================================

    /// 导师同意答辩 (InSupervision, 仅置标记)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn sign_off_supervision(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
    ) -> EngineResult<ThesisRecord> {
        self.execute("sign_off_supervision", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            require_supervisor_or_admin(actor, &thesis, "sign_off_supervision")?;
            ensure_version(&thesis, expected_version)?;
            if thesis.state != ThesisState::InSupervision {
                return Err(EngineError::PreconditionNotMet(format!(
                    "只有指导中的论文可以同意答辩, 当前状态 {}",
                    thesis.state
                )));
            }

            thesis.supervisor_sign_off = true;
            save(tx, &mut thesis, now)?;
            Ok(thesis)
        })
    }

    // ==========================================
    // 会话
    // ==========================================

    /// 排期会话
    ///
    /// - SUPERVISION: SupervisorAssigned 时首次排期迁移到 InSupervision
    /// - DEFENSE: ExaminersAssigned → DefenseScheduled
    #[instrument(skip(self, request), fields(actor = %actor.actor_id, kind = %request.kind))]
    pub fn schedule_session(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        request: &SessionRequest,
    ) -> EngineResult<SessionBooking> {
        self.execute("schedule_session", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            match request.kind {
                SessionKind::Supervision => require_supervisor_or_admin(actor, &thesis, "schedule_session")?,
                SessionKind::Defense => require_admin(actor, "schedule_session")?,
            }
            ensure_version(&thesis, expected_version)?;
            match request.kind {
                SessionKind::Supervision => ensure_supervision_phase(&thesis)?,
                SessionKind::Defense => ensure_edge(&thesis, ThesisState::DefenseScheduled)?,
            }

            self.schedule
                .validate_window(request.start_at, request.duration_minutes, now, WindowMode::Upcoming)?;
            let session = self.schedule.build_session(&thesis, request, SessionStatus::Scheduled, now)?;
            self.schedule.book_tx(tx, &session)?;

            match request.kind {
                SessionKind::Supervision => {
                    if thesis.state == ThesisState::SupervisorAssigned {
                        transition(
                            tx,
                            &mut thesis,
                            ThesisState::InSupervision,
                            actor,
                            Some(format!("session={}", session.session_id)),
                            now,
                        )?;
                    }
                }
                SessionKind::Defense => {
                    thesis.defense_session_id = Some(session.session_id.clone());
                    transition(
                        tx,
                        &mut thesis,
                        ThesisState::DefenseScheduled,
                        actor,
                        Some(format!("session={}", session.session_id)),
                        now,
                    )?;
                }
            }
            Ok(SessionBooking { thesis, session })
        })
    }

    /// 补录已发生的指导会话 (状态直接为 COMPLETED)
    #[instrument(skip(self, request), fields(actor = %actor.actor_id))]
    pub fn record_supervision_session(
        &self,
        actor: &Actor,
        thesis_id: &str,
        expected_version: i64,
        request: &SessionRequest,
    ) -> EngineResult<SessionBooking> {
        if request.kind != SessionKind::Supervision {
            return Err(EngineError::Validation("只能补录指导会话".to_string()));
        }

        self.execute("record_supervision_session", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            require_supervisor_or_admin(actor, &thesis, "record_supervision_session")?;
            ensure_version(&thesis, expected_version)?;
            ensure_supervision_phase(&thesis)?;

            self.schedule
                .validate_window(request.start_at, request.duration_minutes, now, WindowMode::Elapsed)?;
            let session = self.schedule.build_session(&thesis, request, SessionStatus::Completed, now)?;
            self.schedule.book_tx(tx, &session)?;

            if thesis.state == ThesisState::SupervisorAssigned {
                transition(
                    tx,
                    &mut thesis,
                    ThesisState::InSupervision,
                    actor,
                    Some(format!("session={}", session.session_id)),
                    now,
                )?;
            }
            Ok(SessionBooking { thesis, session })
        })
    }

    /// 完成会话; 答辩会话完成时 DefenseScheduled → Defended
    #[instrument(skip(self, notes), fields(actor = %actor.actor_id))]
    pub fn complete_session(
        &self,
        actor: &Actor,
        session_id: &str,
        expected_version: i64,
        notes: Option<String>,
    ) -> EngineResult<SessionBooking> {
        self.execute("complete_session", |tx, now| {
            let (mut session, mut thesis) = load_scheduled_session(tx, actor, session_id, expected_version, "complete_session")?;
            if session.start_at > now {
                return Err(EngineError::Validation(format!(
                    "会话尚未开始: start_at={}, now={}",
                    session.start_at, now
                )));
            }

            session.status = SessionStatus::Completed;
            if notes.is_some() {
                session.notes = notes.clone();
            }
            session.updated_at = now;
            session.version = SessionRepository::update_tx(tx, &session)?;

            if session.kind == SessionKind::Defense {
                ensure_current_defense(&thesis, &session)?;
                transition(
                    tx,
                    &mut thesis,
                    ThesisState::Defended,
                    actor,
                    Some(format!("session={}", session.session_id)),
                    now,
                )?;
            }
            Ok(SessionBooking { thesis, session })
        })
    }

    /// 取消会话; 答辩会话取消时 DefenseScheduled → ExaminersAssigned
    #[instrument(skip(self, reason), fields(actor = %actor.actor_id))]
    pub fn cancel_session(
        &self,
        actor: &Actor,
        session_id: &str,
        expected_version: i64,
        reason: Option<String>,
    ) -> EngineResult<SessionBooking> {
        self.execute("cancel_session", |tx, now| {
            let (mut session, mut thesis) = load_scheduled_session(tx, actor, session_id, expected_version, "cancel_session")?;

            session.status = SessionStatus::Cancelled;
            if reason.is_some() {
                session.notes = reason.clone();
            }
            session.updated_at = now;
            session.version = SessionRepository::update_tx(tx, &session)?;

            if session.kind == SessionKind::Defense {
                ensure_current_defense(&thesis, &session)?;
                thesis.defense_session_id = None;
                transition(
                    tx,
                    &mut thesis,
                    ThesisState::ExaminersAssigned,
                    actor,
                    Some(reason.clone().unwrap_or_else(|| "答辩取消".to_string())),
                    now,
                )?;
            }
            Ok(SessionBooking { thesis, session })
        })
    }

    // ==========================================
    // 评分与结果
    // ==========================================

    /// 提交评分 (Defended, 不迁移)
    ///
    /// 评分人必须是答辩组成员且就是操作人本人; 每轮每人一份
    #[instrument(skip(self, rubric_scores, remarks), fields(actor = %actor.actor_id))]
    pub fn submit_evaluation(
        &self,
        actor: &Actor,
        thesis_id: &str,
        rater_id: &str,
        rubric_scores: &BTreeMap<String, i32>,
        remarks: Option<String>,
    ) -> EngineResult<Evaluation> {
        if actor.actor_id != rater_id || !matches!(actor.role, ActorRole::Supervisor | ActorRole::Examiner) {
            return Err(EngineError::RoleNotPermitted(format!(
                "{}({}) 不能代替 {} 提交评分",
                actor.role, actor.actor_id, rater_id
            )));
        }
        validate_rubric(rater_id, rubric_scores)?;

        self.execute("submit_evaluation", |tx, now| {
            let thesis = load_thesis(tx, thesis_id)?;
            if thesis.state != ThesisState::Defended {
                return Err(EngineError::PreconditionNotMet(format!(
                    "只有已答辩的论文可以评分, 当前状态 {}",
                    thesis.state
                )));
            }

            let panel = panel_of(&thesis)?;
            let rater_role = panel.role_of(rater_id).ok_or_else(|| AggregationError::UnexpectedRater {
                rater_id: rater_id.to_string(),
            })?;
            let actor_matches = matches!(
                (rater_role, actor.role),
                (RaterRole::Supervisor, ActorRole::Supervisor) | (RaterRole::Examiner, ActorRole::Examiner)
            );
            if !actor_matches {
                return Err(EngineError::RoleNotPermitted(format!(
                    "{} 在答辩组中的角色为 {}, 操作人角色为 {}",
                    rater_id, rater_role, actor.role
                )));
            }

            let attempt_no = thesis.current_attempt();
            let duplicate = || EngineError::DuplicateEvaluation {
                thesis_id: thesis.thesis_id.clone(),
                rater_id: rater_id.to_string(),
                attempt_no,
            };
            let existing = EvaluationRepository::list_by_thesis_attempt_tx(tx, &thesis.thesis_id, attempt_no)?;
            if existing.iter().any(|e| e.rater_id == rater_id) {
                return Err(duplicate());
            }

            let evaluation = Evaluation {
                evaluation_id: uuid::Uuid::new_v4().to_string(),
                thesis_id: thesis.thesis_id.clone(),
                rater_id: rater_id.to_string(),
                rater_role,
                attempt_no,
                rubric_scores: rubric_scores.clone(),
                remarks: remarks.clone(),
                submitted_at: now,
                archived: false,
                updated_at: now,
                version: 1,
            };
            match EvaluationRepository::insert_tx(tx, &evaluation) {
                Ok(_) => {}
                Err(RepositoryError::UniqueConstraintViolation(_)) => return Err(duplicate()),
                Err(e) => return Err(e.into()),
            }
            info!(
                thesis_id = %thesis.thesis_id,
                rater_id,
                attempt_no,
                "评分已提交"
            );
            Ok(evaluation)
        })
    }

    /// 汇总评分并判定结果 (Defended → Passed | RevisionRequired | Failed)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn record_outcome(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        require_admin(actor, "record_outcome")?;
        let settings = self.settings()?;
        let aggregator = EvaluationAggregator::new(settings.role_weights);

        self.execute("record_outcome", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            ensure_version(&thesis, expected_version)?;
            if thesis.state != ThesisState::Defended {
                return Err(EngineError::InvalidTransition {
                    from: thesis.state,
                    to: ThesisState::Passed,
                });
            }

            let panel = panel_of(&thesis)?;
            let attempt_no = thesis.current_attempt();
            let evaluations = EvaluationRepository::list_by_thesis_attempt_tx(tx, &thesis.thesis_id, attempt_no)?;
            let outcome = aggregator.aggregate(&panel, attempt_no, &evaluations)?;
            let next = outcome.band.next_state();
            let detail = format!(
                "final_score={} band={} distinction={}",
                outcome.final_score, outcome.band, outcome.distinction
            );

            thesis.last_outcome = Some(outcome.clone());
            if next == ThesisState::Failed {
                thesis.final_grade = Some(FinalGrade::from_outcome(&outcome, now));
                self.assignment.release_all_tx(tx, &thesis, now)?;
            }
            transition(tx, &mut thesis, next, actor, Some(detail), now)?;
            Ok(thesis)
        })
    }

    /// 开始修改 (RevisionRequired → InSupervision, 超过上限则 → Failed)
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn begin_revision(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        let settings = self.settings()?;

        self.execute("begin_revision", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            require_supervisor_or_admin(actor, &thesis, "begin_revision")?;
            ensure_version(&thesis, expected_version)?;

            if thesis.state == ThesisState::Failed && thesis.revision_count >= settings.max_revision_count {
                return Err(EngineError::RevisionLimitExceeded {
                    thesis_id: thesis.thesis_id.clone(),
                    max: settings.max_revision_count,
                });
            }
            ensure_edge(&thesis, ThesisState::InSupervision)?;

            let next_count = thesis.revision_count + 1;
            if next_count > settings.max_revision_count {
                let outcome = thesis.last_outcome.clone().ok_or_else(|| {
                    EngineError::Integrity(format!("论文 {} 需修改但没有答辩结果", thesis.thesis_id))
                })?;
                thesis.final_grade = Some(FinalGrade::from_outcome(&outcome, now));
                self.assignment.release_all_tx(tx, &thesis, now)?;
                transition(
                    tx,
                    &mut thesis,
                    ThesisState::Failed,
                    actor,
                    Some(format!("修改次数已达上限 {}", settings.max_revision_count)),
                    now,
                )?;
                return Ok(thesis);
            }

            thesis.revision_count = next_count;
            thesis.supervisor_sign_off = false;
            thesis.defense_session_id = None;
            transition(
                tx,
                &mut thesis,
                ThesisState::InSupervision,
                actor,
                Some(format!("revision={}", next_count)),
                now,
            )?;
            Ok(thesis)
        })
    }

    /// 确认成绩 (Passed → Finalized), 幂等
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn finalize(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        require_admin(actor, "finalize")?;

        self.execute("finalize", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            if matches!(thesis.state, ThesisState::Finalized | ThesisState::Archived) {
                return Ok(thesis);
            }
            ensure_version(&thesis, expected_version)?;
            ensure_edge(&thesis, ThesisState::Finalized)?;

            let outcome = thesis.last_outcome.clone().ok_or_else(|| {
                EngineError::Integrity(format!("论文 {} 已通过但没有答辩结果", thesis.thesis_id))
            })?;
            let grade = FinalGrade::from_outcome(&outcome, now);
            let detail = format!("final_score={}", grade.score);
            thesis.final_grade = Some(grade);
            self.assignment.release_all_tx(tx, &thesis, now)?;
            transition(tx, &mut thesis, ThesisState::Finalized, actor, Some(detail), now)?;
            Ok(thesis)
        })
    }

    /// 归档 (Finalized → Archived), 幂等
    #[instrument(skip(self), fields(actor = %actor.actor_id))]
    pub fn archive(&self, actor: &Actor, thesis_id: &str, expected_version: i64) -> EngineResult<ThesisRecord> {
        require_admin(actor, "archive")?;

        self.execute("archive", |tx, now| {
            let mut thesis = load_thesis(tx, thesis_id)?;
            if thesis.state == ThesisState::Archived {
                return Ok(thesis);
            }
            ensure_version(&thesis, expected_version)?;
            transition(tx, &mut thesis, ThesisState::Archived, actor, None, now)?;
            Ok(thesis)
        })
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn settings(&self) -> EngineResult<WorkflowSettings> {
        Ok(self.config.workflow_settings()?)
    }

    /// 在单个写事务内执行命令; 拒绝时记录 warn
    fn execute<T, F>(&self, operation: &'static str, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Connection, NaiveDateTime) -> EngineResult<T>,
    {
        let now = self.clock.now();
        let result = self.store.write(|tx| f(tx, now));
        if let Err(e) = &result {
            warn!(operation, code = e.code(), category = %e.category(), error = %e, "命令被拒绝");
        }
        result
    }

    fn insert_draft(
        &self,
        tx: &Connection,
        actor: &Actor,
        student_id: &str,
        title: &str,
        abstract_text: &str,
        now: NaiveDateTime,
    ) -> EngineResult<ThesisRecord> {
        let mut student = load_student(tx, student_id)?;
        if student.archived {
            return Err(EngineError::PreconditionNotMet(format!("学生 {} 已归档", student_id)));
        }
        let open = ThesisRepository::list_by_student_tx(tx, student_id)?
            .into_iter()
            .find(|t| !t.archived && !t.state.is_terminal());
        if let Some(open) = open {
            return Err(EngineError::PreconditionNotMet(format!(
                "学生 {} 已有进行中的论文 {} ({})",
                student_id, open.thesis_id, open.state
            )));
        }

        let thesis = ThesisRecord::new_draft(student_id, title.trim(), abstract_text, now);
        ThesisRepository::insert_tx(tx, &thesis)?;
        append_log(tx, &thesis, None, actor, None, now)?;

        student.current_thesis_id = Some(thesis.thesis_id.clone());
        student.updated_at = now;
        StudentRepository::update_tx(tx, &student)?;

        info!(thesis_id = %thesis.thesis_id, student_id, "论文草稿已创建");
        Ok(thesis)
    }
}

// ==========================================
// 事务内辅助函数
// ==========================================

fn load_thesis(tx: &Connection, thesis_id: &str) -> EngineResult<ThesisRecord> {
    let thesis = ThesisRepository::get_tx(tx, thesis_id)?;
    if thesis.archived {
        return Err(EngineError::not_found("ThesisRecord", thesis_id));
    }
    Ok(thesis)
}

fn load_student(tx: &Connection, student_id: &str) -> EngineResult<Student> {
    Ok(StudentRepository::get_tx(tx, student_id)?)
}

/// 读取仍处于 SCHEDULED 的会话及其论文, 并做角色与版本校验
fn load_scheduled_session(
    tx: &Connection,
    actor: &Actor,
    session_id: &str,
    expected_version: i64,
    operation: &str,
) -> EngineResult<(Session, ThesisRecord)> {
    let session = SessionRepository::get_tx(tx, session_id)?;
    if session.archived {
        return Err(EngineError::not_found("Session", session_id));
    }
    let thesis = ThesisRepository::get_tx(tx, &session.thesis_id)?;

    match session.kind {
        SessionKind::Supervision => require_supervisor_or_admin(actor, &thesis, operation)?,
        SessionKind::Defense => require_admin(actor, operation)?,
    }
    if session.version != expected_version {
        return Err(EngineError::VersionConflict {
            entity: "Session".to_string(),
            id: session.session_id.clone(),
            expected: expected_version,
            actual: session.version,
        });
    }
    if session.status != SessionStatus::Scheduled {
        return Err(EngineError::PreconditionNotMet(format!(
            "会话 {} 状态为 {}, 只能处理已排期会话",
            session.session_id, session.status
        )));
    }
    Ok((session, thesis))
}

fn ensure_version(thesis: &ThesisRecord, expected_version: i64) -> EngineResult<()> {
    if thesis.version != expected_version {
        return Err(EngineError::VersionConflict {
            entity: "ThesisRecord".to_string(),
            id: thesis.thesis_id.clone(),
            expected: expected_version,
            actual: thesis.version,
        });
    }
    Ok(())
}

fn ensure_edge(thesis: &ThesisRecord, to: ThesisState) -> EngineResult<()> {
    if !thesis.state.can_transition_to(to) {
        return Err(EngineError::InvalidTransition {
            from: thesis.state,
            to,
        });
    }
    Ok(())
}

fn ensure_supervision_phase(thesis: &ThesisRecord) -> EngineResult<()> {
    match thesis.state {
        ThesisState::SupervisorAssigned | ThesisState::InSupervision => Ok(()),
        other => Err(EngineError::PreconditionNotMet(format!(
            "只有已分配导师或指导中的论文可以安排指导, 当前状态 {}",
            other
        ))),
    }
}

fn ensure_current_defense(thesis: &ThesisRecord, session: &Session) -> EngineResult<()> {
    if thesis.state != ThesisState::DefenseScheduled
        || thesis.defense_session_id.as_deref() != Some(session.session_id.as_str())
    {
        return Err(EngineError::Integrity(format!(
            "答辩会话 {} 与论文 {} 当前状态 {} 不一致",
            session.session_id, thesis.thesis_id, thesis.state
        )));
    }
    Ok(())
}

fn panel_of(thesis: &ThesisRecord) -> EngineResult<Panel> {
    Panel::from_thesis(thesis)
        .ok_or_else(|| EngineError::Integrity(format!("论文 {} 已答辩但没有导师", thesis.thesis_id)))
}

/// 保存不涉及状态迁移的修改
fn save(tx: &Connection, thesis: &mut ThesisRecord, now: NaiveDateTime) -> EngineResult<()> {
    thesis.updated_at = now;
    thesis.version = ThesisRepository::update_tx(tx, thesis)?;
    Ok(())
}

/// 执行状态迁移并追加日志
fn transition(
    tx: &Connection,
    thesis: &mut ThesisRecord,
    to: ThesisState,
    actor: &Actor,
    detail: Option<String>,
    now: NaiveDateTime,
) -> EngineResult<()> {
    ensure_edge(thesis, to)?;
    let from = thesis.state;
    thesis.state = to;
    save(tx, thesis, now)?;
    append_log(tx, thesis, Some(from), actor, detail, now)?;

    info!(
        thesis_id = %thesis.thesis_id,
        from = %from,
        to = %to,
        version = thesis.version,
        actor = %actor.actor_id,
        role = %actor.role,
        "论文状态迁移"
    );
    Ok(())
}

fn append_log(
    tx: &Connection,
    thesis: &ThesisRecord,
    from: Option<ThesisState>,
    actor: &Actor,
    detail: Option<String>,
    now: NaiveDateTime,
) -> EngineResult<()> {
    let log = TransitionLog {
        log_id: uuid::Uuid::new_v4().to_string(),
        thesis_id: thesis.thesis_id.clone(),
        from_state: from,
        to_state: thesis.state,
        actor_id: actor.actor_id.clone(),
        actor_role: actor.role,
        occurred_at: now,
        version_after: thesis.version,
        detail,
    };
    TransitionLogRepository::insert_tx(tx, &log)?;
    Ok(())
}

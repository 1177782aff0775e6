// ==========================================
// 毕业论文管理系统 - 查询 API
// ==========================================
// 红线: 只读, 不产生任何写入
// 职责: 为展示层组装论文视图、教师负载、看板计数
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::thesis_api::require_id;
use crate::domain::evaluation::Evaluation;
use crate::domain::lecturer::normalize_tags;
use crate::domain::session::{Location, Session};
use crate::domain::thesis::ThesisRecord;
use crate::domain::transition_log::TransitionLog;
use crate::domain::types::{Capability, SessionKind, SessionStatus, ThesisState};
use crate::engine::clock::Clock;
use crate::engine::schedule::{ScheduleResolver, SessionConflict, WindowMode};
use crate::repository::{
    EntityStore, EvaluationRepository, SessionRepository, ThesisFilter, ThesisRepository, TransitionLogRepository,
};

// ==========================================
// 视图结构
// ==========================================

/// 论文详情视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThesisView {
    pub thesis: ThesisRecord,
    pub supervision_sessions: Vec<Session>, // 按开始时间升序
    pub defense_session: Option<Session>,   // 当前答辩会话
    pub evaluations: Vec<Evaluation>,
    pub transitions: Vec<TransitionLog>,
}

/// 教师负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LecturerLoad {
    pub lecturer_id: String,
    pub name: String,
    pub active_load: i32,
    pub capacity_limit: i32,
    pub remaining: i32,
    pub utilization: f64, // active_load / capacity_limit, 上限为0时为1.0
}

/// 看板计数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub pending_reviews: i64,    // SUBMITTED + UNDER_REVIEW
    pub scheduled_defenses: i64, // 已排期答辩会话
    pub awaiting_grading: i64,   // DEFENDED
    pub by_state: BTreeMap<ThesisState, i64>,
}

/// 导师推荐
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSuggestion {
    pub lecturer_id: String,
    pub name: String,
    pub matched_tags: Vec<String>,
    pub remaining_capacity: i32,
}

// ==========================================
// QueryApi
// ==========================================
pub struct QueryApi {
    store: Arc<EntityStore>,
    clock: Arc<dyn Clock>,
    schedule: ScheduleResolver,
}

impl QueryApi {
    pub fn new(store: Arc<EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            schedule: ScheduleResolver::new(),
        }
    }

    /// 论文详情 (同一连接锁内读取, 保证各部分一致)
    #[instrument(skip(self))]
    pub fn get_thesis(&self, thesis_id: &str) -> ApiResult<ThesisView> {
        require_id("thesis_id", thesis_id)?;
        self.store.read(|conn| -> ApiResult<ThesisView> {
            let thesis = ThesisRepository::find_by_id_tx(conn, thesis_id)?
                .ok_or_else(|| ApiError::NotFound(format!("ThesisRecord(id={})不存在", thesis_id)))?;

            let sessions = SessionRepository::list_by_thesis_tx(conn, thesis_id)?;
            let defense_session = thesis
                .defense_session_id
                .as_deref()
                .and_then(|id| sessions.iter().find(|s| s.session_id == id).cloned())
                .or_else(|| {
                    sessions
                        .iter()
                        .rev()
                        .find(|s| s.kind == SessionKind::Defense && s.status != SessionStatus::Cancelled)
                        .cloned()
                });
            let supervision_sessions = sessions
                .into_iter()
                .filter(|s| s.kind == SessionKind::Supervision)
                .collect();

            Ok(ThesisView {
                supervision_sessions,
                defense_session,
                evaluations: EvaluationRepository::list_by_thesis_tx(conn, thesis_id)?,
                transitions: TransitionLogRepository::list_by_thesis_tx(conn, thesis_id)?,
                thesis,
            })
        })
    }

    pub fn list_theses(&self, filter: &ThesisFilter) -> ApiResult<Vec<ThesisRecord>> {
        Ok(self.store.theses.list_filtered(filter)?)
    }

    pub fn get_lecturer_load(&self, lecturer_id: &str) -> ApiResult<LecturerLoad> {
        require_id("lecturer_id", lecturer_id)?;
        let lecturer = self
            .store
            .lecturers
            .find_by_id(lecturer_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Lecturer(id={})不存在", lecturer_id)))?;

        let utilization = if lecturer.capacity_limit > 0 {
            lecturer.active_load as f64 / lecturer.capacity_limit as f64
        } else {
            1.0
        };
        Ok(LecturerLoad {
            remaining: lecturer.remaining_capacity(),
            lecturer_id: lecturer.lecturer_id,
            name: lecturer.name,
            active_load: lecturer.active_load,
            capacity_limit: lecturer.capacity_limit,
            utilization,
        })
    }

    /// 参与人 (教师或学生) 即将进行的会话, 按开始时间升序
    pub fn list_upcoming_sessions(&self, participant_id: &str) -> ApiResult<Vec<Session>> {
        require_id("participant_id", participant_id)?;
        Ok(self
            .store
            .sessions
            .list_upcoming_for_participant(participant_id, self.clock.now())?)
    }

    pub fn get_dashboard_counts(&self) -> ApiResult<DashboardCounts> {
        let by_state = self.store.theses.count_by_state()?;
        let count = |s: ThesisState| by_state.get(&s).copied().unwrap_or(0);

        Ok(DashboardCounts {
            pending_reviews: count(ThesisState::Submitted) + count(ThesisState::UnderReview),
            scheduled_defenses: self
                .store
                .sessions
                .count_by_kind_and_status(SessionKind::Defense, SessionStatus::Scheduled)?,
            awaiting_grading: count(ThesisState::Defended),
            by_state,
        })
    }

    pub fn list_transitions(&self, thesis_id: &str) -> ApiResult<Vec<TransitionLog>> {
        require_id("thesis_id", thesis_id)?;
        Ok(self.store.transitions.list_by_thesis(thesis_id)?)
    }

    /// 推荐导师: 有余量的导师, 按 标签重合数 ↓, 剩余容量 ↓, 姓名 ↑ 排序
    pub fn suggest_supervisors<S: AsRef<str>>(&self, expertise_tags: &[S], limit: usize) -> ApiResult<Vec<SupervisorSuggestion>> {
        let wanted = normalize_tags(expertise_tags.iter().map(|t| t.as_ref()));
        let mut suggestions: Vec<SupervisorSuggestion> = self
            .store
            .lecturers
            .list(false)?
            .into_iter()
            .filter(|l| l.has_capability(Capability::Supervisor) && l.has_spare_capacity())
            .map(|l| SupervisorSuggestion {
                matched_tags: l.expertise_tags.intersection(&wanted).cloned().collect(),
                remaining_capacity: l.remaining_capacity(),
                lecturer_id: l.lecturer_id,
                name: l.name,
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.matched_tags
                .len()
                .cmp(&a.matched_tags.len())
                .then(b.remaining_capacity.cmp(&a.remaining_capacity))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.lecturer_id.cmp(&b.lecturer_id))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    /// 排期预览: 只扫描冲突, 不写入
    pub fn check_availability(
        &self,
        participant_ids: &[String],
        location: &Location,
        start_at: NaiveDateTime,
        duration_minutes: i64,
    ) -> ApiResult<Vec<SessionConflict>> {
        let end_at = self
            .schedule
            .validate_window(start_at, duration_minutes, self.clock.now(), WindowMode::Upcoming)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;
        self.store.read(|conn| -> ApiResult<Vec<SessionConflict>> {
            Ok(self
                .schedule
                .find_conflicts_tx(conn, participant_ids, location, start_at, end_at)?)
        })
    }
}

// ==========================================
// 毕业论文管理系统 - 会话排期解析器
// ==========================================
// 红线: 共享参与人或同一地点的未取消会话, [start, end) 不得重叠
// 红线: 冲突扫描与写入必须在同一 IMMEDIATE 事务内 (先提交者胜出)
// ==========================================
// 参与人:
// - 指导会话: 学生 + 导师
// - 答辩会话: 学生 + 评委组
// ==========================================

use crate::domain::session::{Location, Session};
use crate::domain::thesis::ThesisRecord;
use crate::domain::types::{SessionKind, SessionStatus};
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::session_repo::SessionRepository;
use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// 单次会话最长时长 (分钟)
pub const MAX_SESSION_MINUTES: i64 = 24 * 60;

// ==========================================
// ScheduleRejection - 排期拒绝原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRejection {
    #[error("时间冲突: 与会话 {session_id} 重叠 ({reason})")]
    TimeConflict { session_id: String, reason: String },

    #[error("时间窗口无效: {0}")]
    InvalidWindow(String),
}

/// 时间窗口校验模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// 排期: 开始时间不得早于当前时间
    Upcoming,
    /// 补录: 会话必须已经结束
    Elapsed,
}

// ==========================================
// SessionRequest - 排期请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub kind: SessionKind,
    pub start_at: NaiveDateTime,
    pub duration_minutes: i64,
    pub location: Location,
    pub notes: Option<String>,
}

// ==========================================
// SessionConflict - 冲突明细 (预检用)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConflict {
    pub session_id: String,
    pub thesis_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub reason: String,
}

// ==========================================
// ScheduleResolver
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleResolver;

impl ScheduleResolver {
    pub fn new() -> Self {
        Self
    }

    /// 校验时间窗口
    pub fn validate_window(
        &self,
        start_at: NaiveDateTime,
        duration_minutes: i64,
        now: NaiveDateTime,
        mode: WindowMode,
    ) -> Result<NaiveDateTime, ScheduleRejection> {
        if duration_minutes <= 0 {
            return Err(ScheduleRejection::InvalidWindow(format!(
                "时长必须为正数, 实际 {} 分钟",
                duration_minutes
            )));
        }
        if duration_minutes > MAX_SESSION_MINUTES {
            return Err(ScheduleRejection::InvalidWindow(format!(
                "时长 {} 分钟超过上限 {} 分钟",
                duration_minutes, MAX_SESSION_MINUTES
            )));
        }

        let end_at = start_at
            .checked_add_signed(Duration::minutes(duration_minutes))
            .ok_or_else(|| ScheduleRejection::InvalidWindow(format!("结束时间超出可表示范围: {}", start_at)))?;
        match mode {
            WindowMode::Upcoming if start_at < now => Err(ScheduleRejection::InvalidWindow(format!(
                "开始时间 {} 早于当前时间 {}",
                start_at, now
            ))),
            WindowMode::Elapsed if end_at > now => Err(ScheduleRejection::InvalidWindow(format!(
                "补录会话须已结束, 结束时间 {} 晚于当前时间 {}",
                end_at, now
            ))),
            _ => Ok(end_at),
        }
    }

    /// 由论文角色分配推导会话参与教师
    pub fn lecturers_for(&self, thesis: &ThesisRecord, kind: SessionKind) -> EngineResult<Vec<String>> {
        match kind {
            SessionKind::Supervision => thesis
                .supervisor_id
                .clone()
                .map(|sup| vec![sup])
                .ok_or_else(|| EngineError::PreconditionNotMet(format!("论文 {} 尚未分配导师", thesis.thesis_id))),
            SessionKind::Defense => {
                if thesis.examiner_ids.is_empty() {
                    return Err(EngineError::PreconditionNotMet(format!(
                        "论文 {} 尚未分配评委",
                        thesis.thesis_id
                    )));
                }
                Ok(thesis.examiner_ids.clone())
            }
        }
    }

    /// 扫描冲突会话 (按开始时间排序)
    #[instrument(skip(self, tx, participant_ids), fields(location = %location.key()))]
    pub fn find_conflicts_tx(
        &self,
        tx: &Connection,
        participant_ids: &[String],
        location: &Location,
        start_at: NaiveDateTime,
        end_at: NaiveDateTime,
    ) -> EngineResult<Vec<SessionConflict>> {
        let location_key = location.key();
        let sessions = SessionRepository::find_conflicts_tx(tx, participant_ids, &location_key, start_at, end_at)?;
        debug!(count = sessions.len(), "冲突扫描完成");

        // SQL 按存储的 end_at 粗筛, 这里按 [start, end) 复核
        Ok(sessions
            .into_iter()
            .filter(|s| s.overlaps(start_at, end_at))
            .map(|s| {
                let reason = conflict_reason(&s, participant_ids, &location_key);
                SessionConflict {
                    session_id: s.session_id.clone(),
                    thesis_id: s.thesis_id.clone(),
                    start_at: s.start_at,
                    end_at: s.end_at(),
                    reason,
                }
            })
            .collect())
    }

    /// 构造会话 (未写入)
    pub fn build_session(
        &self,
        thesis: &ThesisRecord,
        request: &SessionRequest,
        status: SessionStatus,
        now: NaiveDateTime,
    ) -> EngineResult<Session> {
        if request.location.value().trim().is_empty() {
            return Err(EngineError::Validation("会话地点不能为空".to_string()));
        }
        Ok(Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            thesis_id: thesis.thesis_id.clone(),
            kind: request.kind,
            student_id: thesis.student_id.clone(),
            lecturer_ids: self.lecturers_for(thesis, request.kind)?,
            start_at: request.start_at,
            duration_minutes: request.duration_minutes,
            location: request.location.clone(),
            status,
            attempt_no: thesis.current_attempt(),
            notes: request.notes.clone(),
            archived: false,
            created_at: now,
            updated_at: now,
            version: 1,
        })
    }

    /// 冲突扫描 + 写入 (须在调用方的 IMMEDIATE 事务内)
    ///
    /// # 返回
    /// - `Err(TimeConflict)`: 指明最早的冲突会话
    pub fn book_tx(&self, tx: &Connection, session: &Session) -> EngineResult<()> {
        let conflicts = self.find_conflicts_tx(
            tx,
            &session.participant_ids(),
            &session.location,
            session.start_at,
            session.end_at(),
        )?;
        if let Some(first) = conflicts.into_iter().next() {
            return Err(ScheduleRejection::TimeConflict {
                session_id: first.session_id,
                reason: first.reason,
            }
            .into());
        }

        SessionRepository::insert_tx(tx, session)?;
        info!(
            session_id = %session.session_id,
            thesis_id = %session.thesis_id,
            kind = %session.kind,
            start_at = %session.start_at,
            location = %session.location,
            "会话已排期"
        );
        Ok(())
    }
}

fn conflict_reason(existing: &Session, participant_ids: &[String], location_key: &str) -> String {
    if existing.location.key() == location_key {
        return format!("地点 {} 已被占用", existing.location);
    }
    let existing_participants = existing.participant_ids();
    match participant_ids.iter().find(|p| existing_participants.contains(p)) {
        Some(shared) => format!("参与人 {} 时间重叠", shared),
        None => "时间重叠".to_string(),
    }
}

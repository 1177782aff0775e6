// ==========================================
// 毕业论文管理系统 - 会话数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (冲突判定结果由 ScheduleResolver 解释)
// 存储: session 主表 + session_participant 参与人索引
// 时间: start_at/end_at 为定宽文本, 字符串比较即时间比较
// ==========================================

use crate::db::{format_datetime, parse_datetime, parse_enum, parse_json, UnknownEnumValue};
use crate::domain::session::{Location, Session};
use crate::domain::types::{SessionKind, SessionStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::versioning::ensure_versioned_update;
use chrono::NaiveDateTime;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const ENTITY: &str = "Session";

const SELECT_COLUMNS: &str = r#"SELECT s.session_id, s.thesis_id, s.kind, s.student_id, s.lecturer_ids,
       s.start_at, s.duration_minutes, s.location_kind, s.location_value, s.status,
       s.attempt_no, s.notes, s.archived, s.created_at, s.updated_at, s.version
  FROM session s"#;

// ==========================================
// SessionRepository - 会话仓储
// ==========================================
pub struct SessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SessionRepository {
    /// 创建新的SessionRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, session_id: &str) -> RepositoryResult<Option<Session>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, session_id)
    }

    /// 查询论文的全部会话 (按开始时间排序)
    pub fn list_by_thesis(&self, thesis_id: &str) -> RepositoryResult<Vec<Session>> {
        let conn = self.get_conn()?;
        Self::list_by_thesis_tx(&conn, thesis_id)
    }

    /// 查询参与人即将进行的会话
    ///
    /// # 参数
    /// - `participant_id`: 学生ID或教师ID
    /// - `now`: 只返回 start_at >= now 的已排期会话
    pub fn list_upcoming_for_participant(
        &self,
        participant_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<Vec<Session>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"{}
              WHERE s.status = 'SCHEDULED'
                AND s.archived = 0
                AND s.start_at >= ?1
                AND s.session_id IN (
                    SELECT p.session_id FROM session_participant p WHERE p.participant_id = ?2
                )
              ORDER BY s.start_at, s.session_id"#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params![format_datetime(&now), participant_id], map_row)?
            .collect::<Result<Vec<Session>, _>>()?;
        Ok(sessions)
    }

    /// 按状态统计会话数量
    pub fn count_by_kind_and_status(&self, kind: SessionKind, status: SessionStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM session WHERE kind = ?1 AND status = ?2 AND archived = 0",
            params![kind.to_db_str(), status.to_db_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 写入会话及参与人索引
    pub fn insert_tx(tx: &Connection, session: &Session) -> RepositoryResult<String> {
        tx.execute(
            r#"INSERT INTO session (
                session_id, thesis_id, kind, student_id, lecturer_ids,
                start_at, end_at, duration_minutes, location_kind, location_value, location_key,
                status, attempt_no, notes, archived, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"#,
            params![
                &session.session_id,
                &session.thesis_id,
                session.kind.to_db_str(),
                &session.student_id,
                serde_json::to_string(&session.lecturer_ids)?,
                format_datetime(&session.start_at),
                format_datetime(&session.end_at()),
                session.duration_minutes,
                session.location.kind_str(),
                session.location.value(),
                session.location.key(),
                session.status.to_db_str(),
                session.attempt_no,
                &session.notes,
                session.archived,
                format_datetime(&session.created_at),
                format_datetime(&session.updated_at),
                session.version,
            ],
        )?;

        let lecturer_role = match session.kind {
            SessionKind::Supervision => "SUPERVISOR",
            SessionKind::Defense => "EXAMINER",
        };
        let mut stmt = tx.prepare(
            "INSERT INTO session_participant (session_id, participant_id, participant_role) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![&session.session_id, &session.student_id, "STUDENT"])?;
        for lecturer_id in &session.lecturer_ids {
            stmt.execute(params![&session.session_id, lecturer_id, lecturer_role])?;
        }

        Ok(session.session_id.clone())
    }

    pub fn find_by_id_tx(tx: &Connection, session_id: &str) -> RepositoryResult<Option<Session>> {
        let sql = format!("{} WHERE s.session_id = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![session_id], map_row).optional()?)
    }

    /// 按ID读取, 不存在时返回 NotFound
    pub fn get_tx(tx: &Connection, session_id: &str) -> RepositoryResult<Session> {
        Self::find_by_id_tx(tx, session_id)?.ok_or_else(|| RepositoryError::not_found(ENTITY, session_id))
    }

    pub fn list_by_thesis_tx(tx: &Connection, thesis_id: &str) -> RepositoryResult<Vec<Session>> {
        let sql = format!(
            "{} WHERE s.thesis_id = ?1 ORDER BY s.start_at, s.session_id",
            SELECT_COLUMNS
        );
        let mut stmt = tx.prepare(&sql)?;
        let sessions = stmt
            .query_map(params![thesis_id], map_row)?
            .collect::<Result<Vec<Session>, _>>()?;
        Ok(sessions)
    }

    /// 查找与 [start, end) 重叠且共享参与人或地点的有效会话
    ///
    /// # 参数
    /// - `participant_ids`: 待排会话的全部参与人
    /// - `location_key`: 规范化地点键 (见 `Location::key`)
    ///
    /// # 返回
    /// 按开始时间排序的冲突会话, 首个即最早冲突
    pub fn find_conflicts_tx(
        tx: &Connection,
        participant_ids: &[String],
        location_key: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> RepositoryResult<Vec<Session>> {
        let mut values: Vec<Value> = vec![
            Value::from(format_datetime(&end)),
            Value::from(format_datetime(&start)),
            Value::from(location_key.to_string()),
        ];

        let mut participant_clause = String::new();
        if !participant_ids.is_empty() {
            let placeholders: Vec<String> = (0..participant_ids.len())
                .map(|i| format!("?{}", values.len() + i + 1))
                .collect();
            participant_clause = format!(
                " OR s.session_id IN (SELECT p.session_id FROM session_participant p WHERE p.participant_id IN ({}))",
                placeholders.join(", ")
            );
            values.extend(participant_ids.iter().cloned().map(Value::from));
        }

        let sql = format!(
            r#"{}
              WHERE s.start_at < ?1
                AND s.end_at > ?2
                AND s.status != 'CANCELLED'
                AND s.archived = 0
                AND (s.location_key = ?3{})
              ORDER BY s.start_at, s.session_id"#,
            SELECT_COLUMNS, participant_clause
        );

        let mut stmt = tx.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_from_iter(values), map_row)?
            .collect::<Result<Vec<Session>, _>>()?;
        Ok(sessions)
    }

    /// 统计论文在某一轮次中已完成的指导会话数
    pub fn count_completed_supervisions_tx(
        tx: &Connection,
        thesis_id: &str,
        attempt_no: i32,
    ) -> RepositoryResult<i64> {
        let count: i64 = tx.query_row(
            r#"SELECT COUNT(*) FROM session
               WHERE thesis_id = ?1 AND kind = 'SUPERVISION' AND status = 'COMPLETED'
                 AND attempt_no = ?2 AND archived = 0"#,
            params![thesis_id, attempt_no],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 更新会话状态与备注 (带乐观锁检查)
    pub fn update_tx(tx: &Connection, session: &Session) -> RepositoryResult<i64> {
        let rows = tx.execute(
            r#"UPDATE session
               SET status = ?1, notes = ?2, updated_at = ?3, version = version + 1
               WHERE session_id = ?4 AND version = ?5"#,
            params![
                session.status.to_db_str(),
                &session.notes,
                format_datetime(&session.updated_at),
                &session.session_id,
                session.version,
            ],
        )?;
        ensure_versioned_update(
            tx,
            rows,
            "session",
            "session_id",
            ENTITY,
            &session.session_id,
            session.version,
        )
    }
}

/// 映射数据库行到Session对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let location_kind: String = row.get(7)?;
    let location = Location::from_parts(&location_kind, row.get(8)?).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(UnknownEnumValue(location_kind.clone())))
    })?;

    Ok(Session {
        session_id: row.get(0)?,
        thesis_id: row.get(1)?,
        kind: parse_enum(2, &row.get::<_, String>(2)?, SessionKind::from_db_str)?,
        student_id: row.get(3)?,
        lecturer_ids: parse_json(4, &row.get::<_, String>(4)?)?,
        start_at: parse_datetime(5, &row.get::<_, String>(5)?)?,
        duration_minutes: row.get(6)?,
        location,
        status: parse_enum(9, &row.get::<_, String>(9)?, SessionStatus::from_db_str)?,
        attempt_no: row.get(10)?,
        notes: row.get(11)?,
        archived: row.get(12)?,
        created_at: parse_datetime(13, &row.get::<_, String>(13)?)?,
        updated_at: parse_datetime(14, &row.get::<_, String>(14)?)?,
        version: row.get(15)?,
    })
}

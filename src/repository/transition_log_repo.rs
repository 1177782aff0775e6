// ==========================================
// 毕业论文管理系统 - 状态迁移日志仓储
// ==========================================
// 红线: 只追加, 不更新, 不删除
// ==========================================

use crate::db::{format_datetime, parse_datetime, parse_enum};
use crate::domain::transition_log::TransitionLog;
use crate::domain::types::{ActorRole, ThesisState};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct TransitionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TransitionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询论文的迁移历史 (按版本号升序)
    pub fn list_by_thesis(&self, thesis_id: &str) -> RepositoryResult<Vec<TransitionLog>> {
        let conn = self.get_conn()?;
        Self::list_by_thesis_tx(&conn, thesis_id)
    }

    pub fn insert_tx(tx: &Connection, log: &TransitionLog) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO thesis_transition_log (
                log_id, thesis_id, from_state, to_state, actor_id, actor_role,
                occurred_at, version_after, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                &log.log_id,
                &log.thesis_id,
                log.from_state.map(|s| s.to_db_str()),
                log.to_state.to_db_str(),
                &log.actor_id,
                log.actor_role.to_db_str(),
                format_datetime(&log.occurred_at),
                log.version_after,
                &log.detail,
            ],
        )?;
        Ok(())
    }

    pub fn list_by_thesis_tx(tx: &Connection, thesis_id: &str) -> RepositoryResult<Vec<TransitionLog>> {
        let mut stmt = tx.prepare(
            r#"SELECT log_id, thesis_id, from_state, to_state, actor_id, actor_role,
                      occurred_at, version_after, detail
               FROM thesis_transition_log
               WHERE thesis_id = ?1
               ORDER BY version_after, occurred_at"#,
        )?;
        let logs = stmt
            .query_map(params![thesis_id], |row| {
                let from_state = match row.get::<_, Option<String>>(2)? {
                    Some(raw) => Some(parse_enum(2, &raw, ThesisState::from_db_str)?),
                    None => None,
                };
                Ok(TransitionLog {
                    log_id: row.get(0)?,
                    thesis_id: row.get(1)?,
                    from_state,
                    to_state: parse_enum(3, &row.get::<_, String>(3)?, ThesisState::from_db_str)?,
                    actor_id: row.get(4)?,
                    actor_role: parse_enum(5, &row.get::<_, String>(5)?, ActorRole::from_db_str)?,
                    occurred_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
                    version_after: row.get(7)?,
                    detail: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<TransitionLog>, _>>()?;
        Ok(logs)
    }
}

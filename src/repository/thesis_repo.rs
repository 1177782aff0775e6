// ==========================================
// 毕业论文管理系统 - 论文数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (状态迁移合法性由 WorkflowEngine 判定)
// 存储: examiner_ids 展开为 examiner1_id / examiner2_id 两列 (便于外键与索引)
// ==========================================

use crate::db::{format_datetime, parse_datetime, parse_enum, parse_json};
use crate::domain::thesis::{DefenseOutcome, FinalGrade, ThesisRecord, MAX_EXAMINERS};
use crate::domain::types::ThesisState;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::versioning::ensure_versioned_update;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const ENTITY: &str = "ThesisRecord";

const SELECT_COLUMNS: &str = r#"SELECT t.thesis_id, t.student_id, t.title, t.abstract_text, t.rejection_reason,
       t.supervisor_id, t.examiner1_id, t.examiner2_id, t.state, t.revision_count,
       t.supervisor_sign_off, t.defense_session_id, t.last_outcome_json, t.final_grade_json,
       t.archived, t.created_at, t.updated_at, t.version
  FROM thesis t"#;

// ==========================================
// ThesisFilter - 论文列表过滤条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThesisFilter {
    pub state: Option<ThesisState>,
    pub supervisor_id: Option<String>,
    pub examiner_id: Option<String>,
    pub batch_year: Option<i32>,
    #[serde(default)]
    pub include_archived: bool,
}

// ==========================================
// ThesisRepository - 论文仓储
// ==========================================
pub struct ThesisRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ThesisRepository {
    /// 创建新的ThesisRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, thesis_id: &str) -> RepositoryResult<Option<ThesisRecord>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, thesis_id)
    }

    /// 按过滤条件查询论文 (按创建时间排序)
    pub fn list_filtered(&self, filter: &ThesisFilter) -> RepositoryResult<Vec<ThesisRecord>> {
        let conn = self.get_conn()?;
        Self::list_filtered_tx(&conn, filter)
    }

    /// 按状态统计未归档论文数量
    pub fn count_by_state(&self) -> RepositoryResult<BTreeMap<ThesisState, i64>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT state, COUNT(*) FROM thesis WHERE archived = 0 GROUP BY state")?;
        let rows = stmt
            .query_map([], |row| {
                let state = parse_enum(0, &row.get::<_, String>(0)?, ThesisState::from_db_str)?;
                Ok((state, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(tx: &Connection, thesis: &ThesisRecord) -> RepositoryResult<String> {
        let (examiner1, examiner2) = split_examiners(thesis)?;
        tx.execute(
            r#"INSERT INTO thesis (
                thesis_id, student_id, title, abstract_text, rejection_reason,
                supervisor_id, examiner1_id, examiner2_id, state, revision_count,
                supervisor_sign_off, defense_session_id, last_outcome_json, final_grade_json,
                archived, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"#,
            params![
                &thesis.thesis_id,
                &thesis.student_id,
                &thesis.title,
                &thesis.abstract_text,
                &thesis.rejection_reason,
                &thesis.supervisor_id,
                examiner1,
                examiner2,
                thesis.state.to_db_str(),
                thesis.revision_count,
                thesis.supervisor_sign_off,
                &thesis.defense_session_id,
                to_json_opt(&thesis.last_outcome)?,
                to_json_opt(&thesis.final_grade)?,
                thesis.archived,
                format_datetime(&thesis.created_at),
                format_datetime(&thesis.updated_at),
                thesis.version,
            ],
        )?;
        Ok(thesis.thesis_id.clone())
    }

    pub fn find_by_id_tx(tx: &Connection, thesis_id: &str) -> RepositoryResult<Option<ThesisRecord>> {
        let sql = format!("{} WHERE t.thesis_id = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![thesis_id], map_row).optional()?)
    }

    /// 按ID读取, 不存在时返回 NotFound
    pub fn get_tx(tx: &Connection, thesis_id: &str) -> RepositoryResult<ThesisRecord> {
        Self::find_by_id_tx(tx, thesis_id)?.ok_or_else(|| RepositoryError::not_found(ENTITY, thesis_id))
    }

    /// 查询学生名下所有论文 (按创建时间倒序)
    pub fn list_by_student_tx(tx: &Connection, student_id: &str) -> RepositoryResult<Vec<ThesisRecord>> {
        let sql = format!(
            "{} WHERE t.student_id = ?1 ORDER BY t.created_at DESC, t.thesis_id",
            SELECT_COLUMNS
        );
        let mut stmt = tx.prepare(&sql)?;
        let theses = stmt
            .query_map(params![student_id], map_row)?
            .collect::<Result<Vec<ThesisRecord>, _>>()?;
        Ok(theses)
    }

    pub fn list_filtered_tx(tx: &Connection, filter: &ThesisFilter) -> RepositoryResult<Vec<ThesisRecord>> {
        let mut sql = format!("{} WHERE 1 = 1", SELECT_COLUMNS);
        let mut values: Vec<Value> = Vec::new();
        let mut idx = 1;

        if !filter.include_archived {
            sql.push_str(" AND t.archived = 0");
        }
        if let Some(state) = filter.state {
            sql.push_str(&format!(" AND t.state = ?{}", idx));
            values.push(Value::from(state.to_db_str().to_string()));
            idx += 1;
        }
        if let Some(supervisor_id) = &filter.supervisor_id {
            sql.push_str(&format!(" AND t.supervisor_id = ?{}", idx));
            values.push(Value::from(supervisor_id.clone()));
            idx += 1;
        }
        if let Some(examiner_id) = &filter.examiner_id {
            sql.push_str(&format!(
                " AND (t.examiner1_id = ?{} OR t.examiner2_id = ?{})",
                idx, idx
            ));
            values.push(Value::from(examiner_id.clone()));
            idx += 1;
        }
        if let Some(batch_year) = filter.batch_year {
            sql.push_str(&format!(
                " AND t.student_id IN (SELECT s.student_id FROM student s WHERE s.batch_year = ?{})",
                idx
            ));
            values.push(Value::from(batch_year));
        }

        sql.push_str(" ORDER BY t.created_at, t.thesis_id");

        let mut stmt = tx.prepare(&sql)?;
        let theses = stmt
            .query_map(params_from_iter(values), map_row)?
            .collect::<Result<Vec<ThesisRecord>, _>>()?;
        Ok(theses)
    }

    /// 更新论文全部可变字段 (带乐观锁检查)
    ///
    /// # 返回
    /// - `Ok(new_version)`: 更新成功后的版本号
    /// - `Err(OptimisticLockFailure)`: version 已被其他操作修改
    pub fn update_tx(tx: &Connection, thesis: &ThesisRecord) -> RepositoryResult<i64> {
        let (examiner1, examiner2) = split_examiners(thesis)?;
        let rows = tx.execute(
            r#"UPDATE thesis
               SET title = ?1, abstract_text = ?2, rejection_reason = ?3,
                   supervisor_id = ?4, examiner1_id = ?5, examiner2_id = ?6,
                   state = ?7, revision_count = ?8, supervisor_sign_off = ?9,
                   defense_session_id = ?10, last_outcome_json = ?11, final_grade_json = ?12,
                   archived = ?13, updated_at = ?14, version = version + 1
               WHERE thesis_id = ?15 AND version = ?16"#,
            params![
                &thesis.title,
                &thesis.abstract_text,
                &thesis.rejection_reason,
                &thesis.supervisor_id,
                examiner1,
                examiner2,
                thesis.state.to_db_str(),
                thesis.revision_count,
                thesis.supervisor_sign_off,
                &thesis.defense_session_id,
                to_json_opt(&thesis.last_outcome)?,
                to_json_opt(&thesis.final_grade)?,
                thesis.archived,
                format_datetime(&thesis.updated_at),
                &thesis.thesis_id,
                thesis.version,
            ],
        )?;
        ensure_versioned_update(
            tx,
            rows,
            "thesis",
            "thesis_id",
            ENTITY,
            &thesis.thesis_id,
            thesis.version,
        )
    }
}

fn split_examiners(thesis: &ThesisRecord) -> RepositoryResult<(Option<String>, Option<String>)> {
    if thesis.examiner_ids.len() > MAX_EXAMINERS {
        return Err(RepositoryError::IntegrityViolation(format!(
            "论文 {} 评委数量 {} 超过上限 {}",
            thesis.thesis_id,
            thesis.examiner_ids.len(),
            MAX_EXAMINERS
        )));
    }
    Ok((
        thesis.examiner_ids.first().cloned(),
        thesis.examiner_ids.get(1).cloned(),
    ))
}

fn to_json_opt<T: Serialize>(value: &Option<T>) -> RepositoryResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(RepositoryError::from)
}

/// 映射数据库行到ThesisRecord对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ThesisRecord> {
    let examiner_ids: Vec<String> = [row.get::<_, Option<String>>(6)?, row.get::<_, Option<String>>(7)?]
        .into_iter()
        .flatten()
        .collect();

    let last_outcome: Option<DefenseOutcome> = match row.get::<_, Option<String>>(12)? {
        Some(raw) => Some(parse_json(12, &raw)?),
        None => None,
    };
    let final_grade: Option<FinalGrade> = match row.get::<_, Option<String>>(13)? {
        Some(raw) => Some(parse_json(13, &raw)?),
        None => None,
    };

    Ok(ThesisRecord {
        thesis_id: row.get(0)?,
        student_id: row.get(1)?,
        title: row.get(2)?,
        abstract_text: row.get(3)?,
        rejection_reason: row.get(4)?,
        supervisor_id: row.get(5)?,
        examiner_ids,
        state: parse_enum(8, &row.get::<_, String>(8)?, ThesisState::from_db_str)?,
        revision_count: row.get(9)?,
        supervisor_sign_off: row.get(10)?,
        defense_session_id: row.get(11)?,
        last_outcome,
        final_grade,
        archived: row.get(14)?,
        created_at: parse_datetime(15, &row.get::<_, String>(15)?)?,
        updated_at: parse_datetime(16, &row.get::<_, String>(16)?)?,
        version: row.get(17)?,
    })
}

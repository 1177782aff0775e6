// ==========================================
// 毕业论文管理系统 - 评分数据仓储
// ==========================================
// 红线: (thesis_id, rater_id, attempt_no) 唯一, 由数据库约束兜底
// ==========================================

use crate::db::{format_datetime, parse_datetime, parse_enum, parse_json};
use crate::domain::evaluation::Evaluation;
use crate::domain::types::RaterRole;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"SELECT evaluation_id, thesis_id, rater_id, rater_role, attempt_no,
       rubric_scores, remarks, submitted_at, archived, updated_at, version
  FROM evaluation"#;

// ==========================================
// EvaluationRepository - 评分仓储
// ==========================================
pub struct EvaluationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EvaluationRepository {
    /// 创建新的EvaluationRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询论文全部评分 (按轮次、提交时间排序)
    pub fn list_by_thesis(&self, thesis_id: &str) -> RepositoryResult<Vec<Evaluation>> {
        let conn = self.get_conn()?;
        Self::list_by_thesis_tx(&conn, thesis_id)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 写入评分
    ///
    /// # 返回
    /// - `Err(UniqueConstraintViolation)`: 同一评分人本轮已提交
    pub fn insert_tx(tx: &Connection, evaluation: &Evaluation) -> RepositoryResult<String> {
        tx.execute(
            r#"INSERT INTO evaluation (
                evaluation_id, thesis_id, rater_id, rater_role, attempt_no,
                rubric_scores, remarks, submitted_at, archived, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                &evaluation.evaluation_id,
                &evaluation.thesis_id,
                &evaluation.rater_id,
                evaluation.rater_role.to_db_str(),
                evaluation.attempt_no,
                serde_json::to_string(&evaluation.rubric_scores)?,
                &evaluation.remarks,
                format_datetime(&evaluation.submitted_at),
                evaluation.archived,
                format_datetime(&evaluation.updated_at),
                evaluation.version,
            ],
        )?;
        Ok(evaluation.evaluation_id.clone())
    }

    pub fn list_by_thesis_tx(tx: &Connection, thesis_id: &str) -> RepositoryResult<Vec<Evaluation>> {
        let sql = format!(
            "{} WHERE thesis_id = ?1 AND archived = 0 ORDER BY attempt_no, submitted_at, evaluation_id",
            SELECT_COLUMNS
        );
        let mut stmt = tx.prepare(&sql)?;
        let evaluations = stmt
            .query_map(params![thesis_id], map_row)?
            .collect::<Result<Vec<Evaluation>, _>>()?;
        Ok(evaluations)
    }

    /// 查询某一轮答辩的评分
    pub fn list_by_thesis_attempt_tx(
        tx: &Connection,
        thesis_id: &str,
        attempt_no: i32,
    ) -> RepositoryResult<Vec<Evaluation>> {
        let sql = format!(
            "{} WHERE thesis_id = ?1 AND attempt_no = ?2 AND archived = 0 ORDER BY submitted_at, evaluation_id",
            SELECT_COLUMNS
        );
        let mut stmt = tx.prepare(&sql)?;
        let evaluations = stmt
            .query_map(params![thesis_id, attempt_no], map_row)?
            .collect::<Result<Vec<Evaluation>, _>>()?;
        Ok(evaluations)
    }
}

/// 映射数据库行到Evaluation对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Evaluation> {
    Ok(Evaluation {
        evaluation_id: row.get(0)?,
        thesis_id: row.get(1)?,
        rater_id: row.get(2)?,
        rater_role: parse_enum(3, &row.get::<_, String>(3)?, RaterRole::from_db_str)?,
        attempt_no: row.get(4)?,
        rubric_scores: parse_json(5, &row.get::<_, String>(5)?)?,
        remarks: row.get(6)?,
        submitted_at: parse_datetime(7, &row.get::<_, String>(7)?)?,
        archived: row.get(8)?,
        updated_at: parse_datetime(9, &row.get::<_, String>(9)?)?,
        version: row.get(10)?,
    })
}

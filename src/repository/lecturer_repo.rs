// ==========================================
// 毕业论文管理系统 - 教师数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑 (负载上限由 AssignmentResolver 判定)
// ==========================================

use crate::db::{format_datetime, parse_datetime, parse_json};
use crate::domain::lecturer::Lecturer;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::versioning::{archive_row, ensure_versioned_update};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const ENTITY: &str = "Lecturer";

const SELECT_COLUMNS: &str = r#"SELECT lecturer_id, employee_no, name, expertise_tags, capabilities,
       capacity_limit, active_load, archived, created_at, updated_at, version
  FROM lecturer"#;

// ==========================================
// LecturerRepository - 教师仓储
// ==========================================
pub struct LecturerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LecturerRepository {
    /// 创建新的LecturerRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn create(&self, lecturer: &Lecturer) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, lecturer)
    }

    pub fn find_by_id(&self, lecturer_id: &str) -> RepositoryResult<Option<Lecturer>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, lecturer_id)
    }

    pub fn find_by_employee_no(&self, employee_no: &str) -> RepositoryResult<Option<Lecturer>> {
        let conn = self.get_conn()?;
        Self::find_by_employee_no_tx(&conn, employee_no)
    }

    /// 查询教师列表 (按姓名排序)
    pub fn list(&self, include_archived: bool) -> RepositoryResult<Vec<Lecturer>> {
        let conn = self.get_conn()?;
        Self::list_tx(&conn, include_archived)
    }

    /// 更新教师 (带乐观锁检查)
    pub fn update(&self, lecturer: &Lecturer) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::update_tx(&conn, lecturer)
    }

    /// 软删除
    pub fn archive(&self, lecturer_id: &str, expected_version: i64, now: NaiveDateTime) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::archive_tx(&conn, lecturer_id, expected_version, now)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(tx: &Connection, lecturer: &Lecturer) -> RepositoryResult<String> {
        tx.execute(
            r#"INSERT INTO lecturer (
                lecturer_id, employee_no, name, expertise_tags, capabilities,
                capacity_limit, active_load, archived, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                &lecturer.lecturer_id,
                &lecturer.employee_no,
                &lecturer.name,
                serde_json::to_string(&lecturer.expertise_tags)?,
                serde_json::to_string(&lecturer.capabilities)?,
                lecturer.capacity_limit,
                lecturer.active_load,
                lecturer.archived,
                format_datetime(&lecturer.created_at),
                format_datetime(&lecturer.updated_at),
                lecturer.version,
            ],
        )?;
        Ok(lecturer.lecturer_id.clone())
    }

    pub fn find_by_id_tx(tx: &Connection, lecturer_id: &str) -> RepositoryResult<Option<Lecturer>> {
        let sql = format!("{} WHERE lecturer_id = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![lecturer_id], map_row).optional()?)
    }

    pub fn find_by_employee_no_tx(tx: &Connection, employee_no: &str) -> RepositoryResult<Option<Lecturer>> {
        let sql = format!("{} WHERE employee_no = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![employee_no.trim()], map_row).optional()?)
    }

    /// 按ID读取, 不存在时返回 NotFound
    pub fn get_tx(tx: &Connection, lecturer_id: &str) -> RepositoryResult<Lecturer> {
        Self::find_by_id_tx(tx, lecturer_id)?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, lecturer_id))
    }

    pub fn list_tx(tx: &Connection, include_archived: bool) -> RepositoryResult<Vec<Lecturer>> {
        let sql = format!(
            "{} WHERE (?1 = 1 OR archived = 0) ORDER BY name, employee_no",
            SELECT_COLUMNS
        );
        let mut stmt = tx.prepare(&sql)?;
        let lecturers = stmt
            .query_map(params![include_archived], map_row)?
            .collect::<Result<Vec<Lecturer>, _>>()?;
        Ok(lecturers)
    }

    pub fn update_tx(tx: &Connection, lecturer: &Lecturer) -> RepositoryResult<i64> {
        let rows = tx.execute(
            r#"UPDATE lecturer
               SET name = ?1, expertise_tags = ?2, capabilities = ?3,
                   capacity_limit = ?4, active_load = ?5,
                   updated_at = ?6, version = version + 1
               WHERE lecturer_id = ?7 AND version = ?8"#,
            params![
                &lecturer.name,
                serde_json::to_string(&lecturer.expertise_tags)?,
                serde_json::to_string(&lecturer.capabilities)?,
                lecturer.capacity_limit,
                lecturer.active_load,
                format_datetime(&lecturer.updated_at),
                &lecturer.lecturer_id,
                lecturer.version,
            ],
        )?;
        ensure_versioned_update(
            tx,
            rows,
            "lecturer",
            "lecturer_id",
            ENTITY,
            &lecturer.lecturer_id,
            lecturer.version,
        )
    }

    pub fn archive_tx(tx: &Connection, lecturer_id: &str, expected_version: i64, now: NaiveDateTime) -> RepositoryResult<i64> {
        archive_row(
            tx,
            "lecturer",
            "lecturer_id",
            ENTITY,
            lecturer_id,
            expected_version,
            &format_datetime(&now),
        )
    }
}

/// 映射数据库行到Lecturer对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Lecturer> {
    Ok(Lecturer {
        lecturer_id: row.get(0)?,
        employee_no: row.get(1)?,
        name: row.get(2)?,
        expertise_tags: parse_json(3, &row.get::<_, String>(3)?)?,
        capabilities: parse_json(4, &row.get::<_, String>(4)?)?,
        capacity_limit: row.get(5)?,
        active_load: row.get(6)?,
        archived: row.get(7)?,
        created_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_datetime(9, &row.get::<_, String>(9)?)?,
        version: row.get(10)?,
    })
}

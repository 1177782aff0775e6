// ==========================================
// 毕业论文管理系统 - 学生数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::{format_datetime, parse_datetime};
use crate::domain::student::Student;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::versioning::{archive_row, ensure_versioned_update};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const ENTITY: &str = "Student";

const SELECT_COLUMNS: &str = r#"SELECT student_id, registration_no, name, program, batch_year,
       current_thesis_id, archived, created_at, updated_at, version
  FROM student"#;

// ==========================================
// StudentRepository - 学生仓储
// ==========================================
pub struct StudentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StudentRepository {
    /// 创建新的StudentRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn create(&self, student: &Student) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, student)
    }

    pub fn find_by_id(&self, student_id: &str) -> RepositoryResult<Option<Student>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, student_id)
    }

    pub fn find_by_registration_no(&self, registration_no: &str) -> RepositoryResult<Option<Student>> {
        let conn = self.get_conn()?;
        Self::find_by_registration_no_tx(&conn, registration_no)
    }

    /// 查询学生列表
    ///
    /// # 参数
    /// - `include_archived`: 是否包含已软删除的学生
    pub fn list(&self, include_archived: bool) -> RepositoryResult<Vec<Student>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE (?1 = 1 OR archived = 0) ORDER BY batch_year DESC, registration_no",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map(params![include_archived], map_row)?
            .collect::<Result<Vec<Student>, _>>()?;
        Ok(students)
    }

    /// 更新学生 (带乐观锁检查)
    ///
    /// # 返回
    /// - `Ok(new_version)`: 更新成功后的版本号
    /// - `Err(OptimisticLockFailure)`: version 已被其他操作修改
    pub fn update(&self, student: &Student) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::update_tx(&conn, student)
    }

    /// 软删除
    pub fn archive(&self, student_id: &str, expected_version: i64, now: NaiveDateTime) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::archive_tx(&conn, student_id, expected_version, now)
    }

    // ==========================================
    // 事务内操作 (供 EntityStore::write 使用)
    // ==========================================

    pub fn insert_tx(tx: &Connection, student: &Student) -> RepositoryResult<String> {
        tx.execute(
            r#"INSERT INTO student (
                student_id, registration_no, name, program, batch_year,
                current_thesis_id, archived, created_at, updated_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                &student.student_id,
                &student.registration_no,
                &student.name,
                &student.program,
                student.batch_year,
                &student.current_thesis_id,
                student.archived,
                format_datetime(&student.created_at),
                format_datetime(&student.updated_at),
                student.version,
            ],
        )?;
        Ok(student.student_id.clone())
    }

    pub fn find_by_id_tx(tx: &Connection, student_id: &str) -> RepositoryResult<Option<Student>> {
        let sql = format!("{} WHERE student_id = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![student_id], map_row).optional()?)
    }

    pub fn find_by_registration_no_tx(
        tx: &Connection,
        registration_no: &str,
    ) -> RepositoryResult<Option<Student>> {
        let sql = format!("{} WHERE registration_no = ?1", SELECT_COLUMNS);
        Ok(tx.query_row(&sql, params![registration_no.trim()], map_row).optional()?)
    }

    /// 按ID读取, 不存在时返回 NotFound
    pub fn get_tx(tx: &Connection, student_id: &str) -> RepositoryResult<Student> {
        Self::find_by_id_tx(tx, student_id)?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, student_id))
    }

    pub fn update_tx(tx: &Connection, student: &Student) -> RepositoryResult<i64> {
        let rows = tx.execute(
            r#"UPDATE student
               SET name = ?1, program = ?2, current_thesis_id = ?3,
                   updated_at = ?4, version = version + 1
               WHERE student_id = ?5 AND version = ?6"#,
            params![
                &student.name,
                &student.program,
                &student.current_thesis_id,
                format_datetime(&student.updated_at),
                &student.student_id,
                student.version,
            ],
        )?;
        ensure_versioned_update(
            tx,
            rows,
            "student",
            "student_id",
            ENTITY,
            &student.student_id,
            student.version,
        )
    }

    pub fn archive_tx(tx: &Connection, student_id: &str, expected_version: i64, now: NaiveDateTime) -> RepositoryResult<i64> {
        archive_row(
            tx,
            "student",
            "student_id",
            ENTITY,
            student_id,
            expected_version,
            &format_datetime(&now),
        )
    }
}

/// 映射数据库行到Student对象
fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: row.get(0)?,
        registration_no: row.get(1)?,
        name: row.get(2)?,
        program: row.get(3)?,
        batch_year: row.get(4)?,
        current_thesis_id: row.get(5)?,
        archived: row.get(6)?,
        created_at: parse_datetime(7, &row.get::<_, String>(7)?)?,
        updated_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
        version: row.get(9)?,
    })
}

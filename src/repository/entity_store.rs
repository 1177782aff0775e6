// ==========================================
// 毕业论文管理系统 - 实体存储
// ==========================================
// 职责: 持有共享连接与各仓储; 提供单事务批量写入
// 红线: 多实体写入必须在同一 BEGIN IMMEDIATE 事务内完成, 失败整体回滚
// 红线: write/read 闭包内只能调用仓储的 *_tx 方法 (自加锁方法会死锁)
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema, install_sql_profiling, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::evaluation_repo::EvaluationRepository;
use crate::repository::lecturer_repo::LecturerRepository;
use crate::repository::session_repo::SessionRepository;
use crate::repository::student_repo::StudentRepository;
use crate::repository::thesis_repo::ThesisRepository;
use crate::repository::transition_log_repo::TransitionLogRepository;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};

// ==========================================
// EntityStore
// ==========================================
pub struct EntityStore {
    conn: Arc<Mutex<Connection>>,
    pub students: StudentRepository,
    pub lecturers: LecturerRepository,
    pub theses: ThesisRepository,
    pub sessions: SessionRepository,
    pub evaluations: EvaluationRepository,
    pub transitions: TransitionLogRepository,
}

impl EntityStore {
    /// 打开数据库文件并建表
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        install_sql_profiling(&mut conn);
        init_schema(&conn)?;
        Ok(Self::from_shared(Arc::new(Mutex::new(conn))))
    }

    /// 内存数据库 (单元测试用)
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self::from_shared(Arc::new(Mutex::new(conn))))
    }

    /// 基于已有共享连接构建
    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            students: StudentRepository::new(conn.clone()),
            lecturers: LecturerRepository::new(conn.clone()),
            theses: ThesisRepository::new(conn.clone()),
            sessions: SessionRepository::new(conn.clone()),
            evaluations: EvaluationRepository::new(conn.clone()),
            transitions: TransitionLogRepository::new(conn.clone()),
            conn,
        }
    }

    /// 共享连接 (供 ConfigManager 等复用)
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 在单个 IMMEDIATE 事务中执行读-校验-写
    ///
    /// 闭包返回 Err 时事务随 Transaction drop 回滚; 返回 Ok 时提交
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| E::from(RepositoryError::LockError(e.to_string())))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(RepositoryError::DatabaseTransactionError(e.to_string())))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| E::from(RepositoryError::DatabaseTransactionError(e.to_string())))?;
        Ok(value)
    }

    /// 只读访问 (最新已提交状态)
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| E::from(RepositoryError::LockError(e.to_string())))?;
        f(&conn)
    }
}

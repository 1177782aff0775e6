// ==========================================
// 毕业论文管理系统 - 乐观锁辅助
// ==========================================
// 所有实体表共用: UPDATE ... WHERE id = ? AND version = ?
// 影响行数为 0 时区分 "版本过期" 与 "记录不存在"
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};

/// 校验带版本条件的 UPDATE 结果
///
/// # 返回
/// - `Ok(new_version)`: 更新成功, 返回新版本号 (expected + 1)
/// - `Err(OptimisticLockFailure)`: 记录存在但版本不匹配
/// - `Err(NotFound)`: 记录不存在
pub(crate) fn ensure_versioned_update(
    conn: &Connection,
    rows_affected: usize,
    table: &str,
    id_column: &str,
    entity: &str,
    id: &str,
    expected: i64,
) -> RepositoryResult<i64> {
    if rows_affected > 0 {
        return Ok(expected + 1);
    }

    let sql = format!("SELECT version FROM {} WHERE {} = ?1", table, id_column);
    let actual: Option<i64> = conn
        .query_row(&sql, params![id], |row| row.get(0))
        .optional()?;

    match actual {
        Some(actual) => Err(RepositoryError::OptimisticLockFailure {
            entity: entity.to_string(),
            id: id.to_string(),
            expected,
            actual,
        }),
        None => Err(RepositoryError::not_found(entity, id)),
    }
}

/// 软删除 (archived = 1, 版本 +1)
pub(crate) fn archive_row(
    conn: &Connection,
    table: &str,
    id_column: &str,
    entity: &str,
    id: &str,
    expected: i64,
    updated_at: &str,
) -> RepositoryResult<i64> {
    let sql = format!(
        "UPDATE {} SET archived = 1, updated_at = ?1, version = version + 1 WHERE {} = ?2 AND version = ?3",
        table, id_column
    );
    let rows = conn.execute(&sql, params![updated_at, id, expected])?;
    ensure_versioned_update(conn, rows, table, id_column, entity, id, expected)
}

// ==========================================
// 毕业论文管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约束: 与 EntityStore 共用连接, 必须在写事务开启前读取
// ==========================================

use crate::config::grading_profile::GradingWeights;
use crate::engine::aggregation::RoleWeights;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// WorkflowSettings - 单次命令使用的配置快照
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    pub max_revision_count: i32,
    pub min_completed_supervisions: i64,
    pub default_capacity_limit: i32,
    #[serde(skip)]
    pub role_weights: RoleWeights,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_revision_count: defaults::MAX_REVISION_COUNT,
            min_completed_supervisions: defaults::MIN_COMPLETED_SUPERVISIONS,
            default_capacity_limit: defaults::DEFAULT_CAPACITY_LIMIT,
            role_weights: RoleWeights::default(),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    ///
    /// 已知键会先校验格式, 拒绝写入无法解析的值
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        validate_value(key, value)?;
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    fn get_parsed_or_default<T: std::str::FromStr + Copy + std::fmt::Display>(
        &self,
        key: &str,
        default: T,
    ) -> RepositoryResult<T> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取最大修改次数 (默认 3)
    pub fn get_max_revision_count(&self) -> RepositoryResult<i32> {
        self.get_parsed_or_default(config_keys::MAX_REVISION_COUNT, defaults::MAX_REVISION_COUNT)
    }

    /// 获取教师默认负载上限 (默认 8)
    pub fn get_default_capacity_limit(&self) -> RepositoryResult<i32> {
        self.get_parsed_or_default(config_keys::DEFAULT_CAPACITY_LIMIT, defaults::DEFAULT_CAPACITY_LIMIT)
    }

    /// 获取答辩前最少完成的指导次数 (默认 1)
    pub fn get_min_completed_supervisions(&self) -> RepositoryResult<i64> {
        self.get_parsed_or_default(
            config_keys::MIN_COMPLETED_SUPERVISIONS,
            defaults::MIN_COMPLETED_SUPERVISIONS,
        )
    }

    /// 获取评分权重
    ///
    /// # 说明
    /// 配置缺失或格式错误（含合计不为 1.0）时使用默认 30% / 70%
    pub fn get_grading_weights(&self) -> RepositoryResult<GradingWeights> {
        let Some(raw) = self.get_global_config_value(config_keys::GRADING_WEIGHTS)? else {
            return Ok(GradingWeights::default());
        };
        let parsed = serde_json::from_str::<GradingWeights>(&raw)
            .ok()
            .filter(|w| w.to_role_weights().is_ok());
        Ok(parsed.unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::GRADING_WEIGHTS,
                raw_value = %raw,
                "评分权重配置无效，使用默认权重"
            );
            GradingWeights::default()
        }))
    }

    /// 读取单次命令所需的全部配置
    pub fn workflow_settings(&self) -> RepositoryResult<WorkflowSettings> {
        let weights = self.get_grading_weights()?;
        Ok(WorkflowSettings {
            max_revision_count: self.get_max_revision_count()?,
            min_completed_supervisions: self.get_min_completed_supervisions()?,
            default_capacity_limit: self.get_default_capacity_limit()?,
            role_weights: weights.to_role_weights().unwrap_or_default(),
        })
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let config_map = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

/// 已知键的格式校验
fn validate_value(key: &str, value: &str) -> RepositoryResult<()> {
    let invalid = |message: String| RepositoryError::SerializationError {
        field: key.to_string(),
        message,
    };
    match key {
        config_keys::MAX_REVISION_COUNT | config_keys::DEFAULT_CAPACITY_LIMIT => {
            let v: i32 = value.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
            if v < 0 {
                return Err(invalid(format!("值不能为负数: {}", v)));
            }
        }
        config_keys::MIN_COMPLETED_SUPERVISIONS => {
            let v: i64 = value.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
            if v < 0 {
                return Err(invalid(format!("值不能为负数: {}", v)));
            }
        }
        config_keys::GRADING_WEIGHTS => {
            let weights: GradingWeights =
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?;
            weights.to_role_weights().map_err(|e| invalid(e.to_string()))?;
        }
        _ => {}
    }
    Ok(())
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 修改
    pub const MAX_REVISION_COUNT: &str = "max_revision_count";

    // 评分
    pub const GRADING_WEIGHTS: &str = "grading_weights"; // JSON

    // 负载
    pub const DEFAULT_CAPACITY_LIMIT: &str = "default_capacity_limit";

    // 指导
    pub const MIN_COMPLETED_SUPERVISIONS: &str = "min_completed_supervisions";
}

pub mod defaults {
    pub const MAX_REVISION_COUNT: i32 = 3;
    pub const DEFAULT_CAPACITY_LIMIT: i32 = 8;
    pub const MIN_COMPLETED_SUPERVISIONS: i64 = 1;
}

// ==========================================
// 毕业论文管理系统 - 应用状态
// ==========================================
// 职责: 由数据库路径装配 EntityStore / 引擎 / API 实例
// ==========================================

use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{DirectoryApi, QueryApi, ThesisApi};
use crate::config::ConfigManager;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::workflow::WorkflowEngine;
use crate::repository::{EntityStore, RepositoryResult};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "THESIS_LIFECYCLE_DB_PATH";

/// 应用状态
///
/// 所有组件共享同一个 SQLite 连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub store: Arc<EntityStore>,
    pub config: Arc<ConfigManager>,
    pub engine: Arc<WorkflowEngine>,

    /// 论文命令API
    pub thesis_api: Arc<ThesisApi>,

    /// 查询API
    pub query_api: Arc<QueryApi>,

    /// 名录管理API
    pub directory_api: Arc<DirectoryApi>,
}

impl AppState {
    /// 打开 (必要时创建) 数据库并装配全部组件
    pub fn new(db_path: String) -> RepositoryResult<Self> {
        Self::with_clock(db_path, Arc::new(SystemClock))
    }

    /// 指定时钟装配 (测试注入 FixedClock)
    pub fn with_clock(db_path: String, clock: Arc<dyn Clock>) -> RepositoryResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let store = Arc::new(EntityStore::open(&db_path)?);
        Self::assemble(db_path, store, clock)
    }

    fn assemble(db_path: String, store: Arc<EntityStore>, clock: Arc<dyn Clock>) -> RepositoryResult<Self> {
        let config = Arc::new(ConfigManager::from_connection(store.connection())?);
        let engine = Arc::new(WorkflowEngine::new(store.clone(), config.clone(), clock.clone()));

        let thesis_api = Arc::new(ThesisApi::new(engine.clone(), store.clone()));
        let query_api = Arc::new(QueryApi::new(store.clone(), clock.clone()));
        let directory_api = Arc::new(DirectoryApi::new(store.clone(), config.clone(), clock));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            store,
            config,
            engine,
            thesis_api,
            query_api,
            directory_api,
        })
    }
}

/// 默认数据库路径
///
/// 优先级: 环境变量 THESIS_LIFECYCLE_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./thesis_lifecycle.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("thesis-lifecycle");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("thesis_lifecycle.db");
        }
    }

    path.to_string_lossy().to_string()
}

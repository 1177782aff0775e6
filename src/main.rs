// ==========================================
// 毕业论文管理系统 - 管理命令行
// ==========================================
// 用法: thesis-admin [--db PATH] <子命令>
// 输出: stdout 为格式化 JSON, 日志写 stderr
// ==========================================

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use thesis_lifecycle::api::ApiError;
use thesis_lifecycle::app::{get_default_db_path, AppState};
use thesis_lifecycle::domain::types::Actor;
use thesis_lifecycle::logging;

#[derive(Debug, Parser)]
#[command(name = "thesis-admin")]
#[command(about = "毕业论文管理系统 - 管理命令行", long_about = None)]
#[command(version)]
struct Cli {
    /// 数据库路径 (缺省: THESIS_LIFECYCLE_DB_PATH 或用户数据目录)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Commands {
    /// 初始化数据库并输出当前配置
    Init,
    /// 导入学生名册 (.csv/.xlsx/.xls)
    ImportStudents { file: PathBuf },
    /// 导入教师名册 (.csv/.xlsx/.xls)
    ImportLecturers { file: PathBuf },
    /// 看板计数
    Dashboard,
    /// 教师负载
    Load { lecturer_id: String },
    /// 参与人的待进行会话
    Upcoming { participant_id: String },
    /// 论文详情
    Thesis { thesis_id: String },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db_path = cli.db.unwrap_or_else(get_default_db_path);
    tracing::info!("{} v{} 使用数据库: {}", thesis_lifecycle::APP_NAME, thesis_lifecycle::VERSION, db_path);
    let state = AppState::new(db_path.clone()).with_context(|| format!("无法打开数据库 {}", db_path))?;
    let admin = Actor::admin("cli");

    match cli.command {
        Commands::Init => print_json(&serde_json::json!({
            "db_path": state.db_path,
            "config": serde_json::from_str::<serde_json::Value>(&state.config.get_config_snapshot()?)?,
        })),
        Commands::ImportStudents { file } => print_json(&api(state.directory_api.import_students(&admin, file))?),
        Commands::ImportLecturers { file } => print_json(&api(state.directory_api.import_lecturers(&admin, file))?),
        Commands::Dashboard => print_json(&api(state.query_api.get_dashboard_counts())?),
        Commands::Load { lecturer_id } => print_json(&api(state.query_api.get_lecturer_load(&lecturer_id))?),
        Commands::Upcoming { participant_id } => {
            print_json(&api(state.query_api.list_upcoming_sessions(&participant_id))?)
        }
        Commands::Thesis { thesis_id } => print_json(&api(state.query_api.get_thesis(&thesis_id))?),
    }
}

/// ApiError 以 ErrorResponse JSON 形式报告
fn api<T>(result: Result<T, ApiError>) -> Result<T> {
    result.map_err(|e| {
        let body = serde_json::to_string(&e.to_response()).unwrap_or_else(|_| e.to_string());
        anyhow!(body)
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_flag_and_subcommand() {
        let cli = Cli::try_parse_from(["thesis-admin", "--db", "/tmp/ta.db", "load", "L-1"]).unwrap();
        assert_eq!(cli.db.as_deref(), Some("/tmp/ta.db"));
        assert_eq!(
            cli.command,
            Commands::Load {
                lecturer_id: "L-1".to_string()
            }
        );

        // --db 为全局参数, 可放在子命令之后
        let cli = Cli::try_parse_from(["thesis-admin", "import-students", "roster.csv", "--db=x.db"]).unwrap();
        assert_eq!(cli.db.as_deref(), Some("x.db"));
        assert_eq!(
            cli.command,
            Commands::ImportStudents {
                file: PathBuf::from("roster.csv")
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_argument() {
        assert!(Cli::try_parse_from(["thesis-admin", "thesis"]).is_err());
        assert!(Cli::try_parse_from(["thesis-admin", "unknown"]).is_err());
        assert!(Cli::try_parse_from(["thesis-admin"]).is_err());
    }
}

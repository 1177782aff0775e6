// ==========================================
// 毕业论文管理系统 - API 层
// ==========================================
// 职责: 对外命令/查询接口, 错误统一为 ApiError
// ==========================================

pub mod directory_api;
pub mod error;
pub mod query_api;
pub mod thesis_api;

// 重导出核心类型
pub use directory_api::{DirectoryApi, LecturerUpdate, NewLecturer, NewStudent};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use query_api::{DashboardCounts, LecturerLoad, QueryApi, SupervisorSuggestion, ThesisView};
pub use thesis_api::ThesisApi;

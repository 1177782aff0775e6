// ==========================================
// 毕业论文管理系统 - 引擎层
// ==========================================
// 职责: 状态机、角色分配、排期冲突、成绩汇总
// 红线: Engine 不拼 SQL, 所有拒绝必须输出 reason
// ==========================================

pub mod aggregation;
pub mod assignment;
pub mod clock;
pub mod error;
pub mod policy;
pub mod schedule;
pub mod workflow;

// 重导出核心引擎
pub use aggregation::{band_for, AggregationError, EvaluationAggregator, Panel, RoleWeights};
pub use assignment::{AssignmentPlan, AssignmentRejection, AssignmentResolver};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{EngineError, EngineResult, ErrorCategory};
pub use schedule::{ScheduleRejection, ScheduleResolver, SessionConflict, SessionRequest, WindowMode};
pub use workflow::{ReviewDecision, SessionBooking, WorkflowEngine};

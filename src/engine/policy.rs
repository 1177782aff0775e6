// ==========================================
// 毕业论文管理系统 - 角色与输入规则
// ==========================================
// 仅做角色标记校验, 不做认证
// ==========================================

use crate::domain::thesis::{ThesisRecord, MAX_TITLE_CHARS};
use crate::domain::types::{Actor, ActorRole};
use crate::engine::error::{EngineError, EngineResult};

/// 管理员或系统
pub fn require_admin(actor: &Actor, operation: &str) -> EngineResult<()> {
    match actor.role {
        ActorRole::Admin | ActorRole::System => Ok(()),
        _ => Err(denied(actor, operation)),
    }
}

/// 论文所属学生或管理员
pub fn require_owner_or_admin(actor: &Actor, student_id: &str, operation: &str) -> EngineResult<()> {
    match actor.role {
        ActorRole::Admin | ActorRole::System => Ok(()),
        ActorRole::Student if actor.actor_id == student_id => Ok(()),
        _ => Err(denied(actor, operation)),
    }
}

/// 本论文导师或管理员
pub fn require_supervisor_or_admin(actor: &Actor, thesis: &ThesisRecord, operation: &str) -> EngineResult<()> {
    match actor.role {
        ActorRole::Admin | ActorRole::System => Ok(()),
        ActorRole::Supervisor if thesis.supervisor_id.as_deref() == Some(actor.actor_id.as_str()) => Ok(()),
        _ => Err(denied(actor, operation)),
    }
}

fn denied(actor: &Actor, operation: &str) -> EngineError {
    EngineError::RoleNotPermitted(format!(
        "{}({}) 无权执行 {}",
        actor.role, actor.actor_id, operation
    ))
}

/// 题目长度校验 (按字符计)
///
/// # 参数
/// - `require_non_empty`: 提交时必须非空, 草稿允许暂空
pub fn validate_title(title: &str, require_non_empty: bool) -> EngineResult<()> {
    let trimmed = title.trim();
    if require_non_empty && trimmed.is_empty() {
        return Err(EngineError::Validation("题目不能为空".to_string()));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(EngineError::Validation(format!(
            "题目长度 {} 超过上限 {} 字符",
            chars, MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn thesis() -> ThesisRecord {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut t = ThesisRecord::new_draft("S1", "Topic", "", now);
        t.supervisor_id = Some("L1".to_string());
        t
    }

    #[test]
    fn test_owner_policy() {
        assert!(require_owner_or_admin(&Actor::new("S1", ActorRole::Student), "S1", "submit").is_ok());
        assert!(require_owner_or_admin(&Actor::new("S2", ActorRole::Student), "S1", "submit").is_err());
        assert!(require_owner_or_admin(&Actor::admin("root"), "S1", "submit").is_ok());
    }

    #[test]
    fn test_supervisor_policy_requires_assigned_one() {
        let t = thesis();
        assert!(require_supervisor_or_admin(&Actor::new("L1", ActorRole::Supervisor), &t, "x").is_ok());
        assert!(require_supervisor_or_admin(&Actor::new("L2", ActorRole::Supervisor), &t, "x").is_err());
        assert!(require_supervisor_or_admin(&Actor::new("L1", ActorRole::Examiner), &t, "x").is_err());
    }

    #[test]
    fn test_title_rules() {
        assert!(validate_title("   ", true).is_err());
        assert!(validate_title("", false).is_ok());
        assert!(validate_title(&"题".repeat(MAX_TITLE_CHARS), true).is_ok());
        assert!(validate_title(&"题".repeat(MAX_TITLE_CHARS + 1), true).is_err());
    }
}

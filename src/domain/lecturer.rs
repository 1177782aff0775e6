// ==========================================
// 毕业论文管理系统 - 教师领域模型
// ==========================================
// 红线: active_load 只由分配/释放流程修改,且不得超过 capacity_limit
// ==========================================

use crate::domain::types::Capability;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// Lecturer - 教师
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecturer {
    pub lecturer_id: String,                // 生成ID
    pub employee_no: String,                // 工号 (NIDN, 唯一)
    pub name: String,                       // 姓名
    pub expertise_tags: BTreeSet<String>,   // 研究方向标签
    pub capabilities: BTreeSet<Capability>, // 可担任角色
    pub capacity_limit: i32,                // 同时在研论文上限
    pub active_load: i32,                   // 当前在研论文数
    pub archived: bool,                     // 软删除标记
    pub created_at: NaiveDateTime,          // 创建时间
    pub updated_at: NaiveDateTime,          // 更新时间
    pub version: i64,                       // 乐观锁版本号
}

impl Lecturer {
    /// 创建新教师 (生成ID, version=1, 负载为0)
    pub fn new(
        employee_no: impl Into<String>,
        name: impl Into<String>,
        capabilities: BTreeSet<Capability>,
        capacity_limit: i32,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            lecturer_id: uuid::Uuid::new_v4().to_string(),
            employee_no: employee_no.into(),
            name: name.into(),
            expertise_tags: BTreeSet::new(),
            capabilities,
            capacity_limit,
            active_load: 0,
            archived: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// 附加研究方向标签 (统一小写)
    pub fn with_expertise<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.expertise_tags = normalize_tags(tags);
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// 是否还能承接一篇论文
    pub fn has_spare_capacity(&self) -> bool {
        self.active_load < self.capacity_limit
    }

    pub fn remaining_capacity(&self) -> i32 {
        (self.capacity_limit - self.active_load).max(0)
    }
}

/// 标签规范化: 去空白、小写、去重
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_capacity_helpers() {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut lecturer = Lecturer::new(
            "0011",
            "Dr. Sari",
            BTreeSet::from([Capability::Supervisor]),
            8,
            now,
        )
        .with_expertise([" NLP ", "nlp", "Data Mining", ""]);

        assert_eq!(lecturer.expertise_tags.len(), 2);
        assert!(lecturer.expertise_tags.contains("data mining"));
        assert!(lecturer.has_capability(Capability::Supervisor));
        assert!(!lecturer.has_capability(Capability::Examiner));

        lecturer.active_load = 7;
        assert!(lecturer.has_spare_capacity());
        lecturer.active_load = 8;
        assert!(!lecturer.has_spare_capacity());
        assert_eq!(lecturer.remaining_capacity(), 0);
    }
}

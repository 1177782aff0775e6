// ==========================================
// 毕业论文管理系统 - 学生领域模型
// ==========================================
// 红线: 身份字段导入后不可变; current_thesis_id 只由 WorkflowEngine 维护
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Student - 学生
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,                // 生成ID
    pub registration_no: String,           // 学号 (NIM, 唯一)
    pub name: String,                      // 姓名
    pub program: String,                   // 专业
    pub batch_year: i32,                   // 入学年份
    pub current_thesis_id: Option<String>, // 当前论文 (0..1)
    pub archived: bool,                    // 软删除标记
    pub created_at: NaiveDateTime,         // 创建时间
    pub updated_at: NaiveDateTime,         // 更新时间
    pub version: i64,                      // 乐观锁版本号
}

impl Student {
    /// 创建新学生 (生成ID, version=1)
    pub fn new(
        registration_no: impl Into<String>,
        name: impl Into<String>,
        program: impl Into<String>,
        batch_year: i32,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            student_id: uuid::Uuid::new_v4().to_string(),
            registration_no: registration_no.into(),
            name: name.into(),
            program: program.into(),
            batch_year,
            current_thesis_id: None,
            archived: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

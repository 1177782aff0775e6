// ==========================================
// 毕业论文管理系统 - 会话 (指导/答辩) 领域模型
// ==========================================
// 红线: 同一参与人或同一地点的未取消会话, [start, end) 不得重叠
// ==========================================

use crate::domain::types::{SessionKind, SessionStatus};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// Location - 会话地点
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    Room(String),    // 实体教室
    Virtual(String), // 线上会议链接
}

impl Location {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Location::Room(_) => "ROOM",
            Location::Virtual(_) => "VIRTUAL",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Location::Room(v) | Location::Virtual(v) => v,
        }
    }

    /// 冲突检测用的规范化键
    ///
    /// 例: Room(" 301 ") 与 Room("301") 视为同一地点
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind_str(), self.value().trim().to_lowercase())
    }

    pub fn from_parts(kind: &str, value: String) -> Option<Self> {
        match kind.trim().to_uppercase().as_str() {
            "ROOM" => Some(Location::Room(value)),
            "VIRTUAL" => Some(Location::Virtual(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Room(r) => write!(f, "教室 {}", r),
            Location::Virtual(link) => write!(f, "线上 {}", link),
        }
    }
}

// ==========================================
// Session - 指导/答辩会话
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,        // 生成ID
    pub thesis_id: String,         // 所属论文
    pub kind: SessionKind,         // 指导/答辩
    pub student_id: String,        // 学生参与人
    pub lecturer_ids: Vec<String>, // 教师参与人 (导师 或 评委组)
    pub start_at: NaiveDateTime,   // 开始时间
    pub duration_minutes: i64,     // 时长 (分钟)
    pub location: Location,        // 地点
    pub status: SessionStatus,     // 状态
    pub attempt_no: i32,           // 创建时的论文轮次
    pub notes: Option<String>,     // 备注
    pub archived: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub version: i64,
}

impl Session {
    /// 结束时间 (不含); 溢出时取 NaiveDateTime::MAX
    pub fn end_at(&self) -> NaiveDateTime {
        self.start_at
            .checked_add_signed(Duration::minutes(self.duration_minutes))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// 与 [start, end) 是否重叠
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start_at < end && start < self.end_at()
    }

    /// 全部参与人 (学生在前)
    pub fn participant_ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(1 + self.lecturer_ids.len());
        ids.push(self.student_id.clone());
        ids.extend(self.lecturer_ids.iter().cloned());
        ids
    }

    pub fn is_active(&self) -> bool {
        self.status != SessionStatus::Cancelled && !self.archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn session(start: NaiveDateTime, minutes: i64) -> Session {
        Session {
            session_id: "SES1".to_string(),
            thesis_id: "T1".to_string(),
            kind: SessionKind::Defense,
            student_id: "S1".to_string(),
            lecturer_ids: vec!["L1".to_string()],
            start_at: start,
            duration_minutes: minutes,
            location: Location::Room("301".to_string()),
            status: SessionStatus::Scheduled,
            attempt_no: 0,
            notes: None,
            archived: false,
            created_at: start,
            updated_at: start,
            version: 1,
        }
    }

    #[test]
    fn test_half_open_interval_overlap() {
        let s = session(at(14, 0), 60);
        assert_eq!(s.end_at(), at(15, 0));
        assert!(s.overlaps(at(14, 30), at(15, 30)));
        assert!(s.overlaps(at(13, 0), at(14, 1)));
        // 首尾相接不算重叠
        assert!(!s.overlaps(at(15, 0), at(16, 0)));
        assert!(!s.overlaps(at(13, 0), at(14, 0)));
    }

    #[test]
    fn test_end_at_saturates_at_max() {
        let s = session(NaiveDateTime::MAX, 60);
        assert_eq!(s.end_at(), NaiveDateTime::MAX);
    }

    #[test]
    fn test_location_key_normalized() {
        assert_eq!(
            Location::Room(" 301 ".to_string()).key(),
            Location::Room("301".to_string()).key()
        );
        assert_ne!(
            Location::Room("301".to_string()).key(),
            Location::Virtual("301".to_string()).key()
        );
        let json = serde_json::to_string(&Location::Room("301".to_string())).unwrap();
        assert_eq!(json, r#"{"kind":"ROOM","value":"301"}"#);
    }
}

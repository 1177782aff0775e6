// ==========================================
// 毕业论文管理系统 - 时钟
// ==========================================
// 引擎只通过 Clock 读取当前时间, 测试注入 FixedClock
// ==========================================

use crate::db::{now_local, truncate_to_seconds};
use chrono::{Duration, NaiveDateTime};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// 当前时间 (本地时区, 秒精度)
    fn now(&self) -> NaiveDateTime;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        now_local()
    }
}

/// 固定时钟 (可手动推进)
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            current: Mutex::new(truncate_to_seconds(at)),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = truncate_to_seconds(at);
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.current.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

use crate::engine::aggregation::{AggregationError, RoleWeights, BASIS_POINTS_TOTAL};
use serde::{Deserialize, Serialize};

/// 评分权重配置（持久化对象）
///
/// 存储位置：config_kv（scope_id='global'，key='grading_weights'）
/// 格式：{"supervisor_weight":0.3,"examiner_panel_weight":0.7}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradingWeights {
    /// 导师权重 (0~1)
    pub supervisor_weight: f64,

    /// 评委组权重 (0~1)，在评委间平均分配
    pub examiner_panel_weight: f64,
}

impl Default for GradingWeights {
    fn default() -> Self {
        Self {
            supervisor_weight: 0.3,
            examiner_panel_weight: 0.7,
        }
    }
}

impl GradingWeights {
    /// 转换为基点权重（四舍五入到 0.01%），合计必须为 10000bp
    pub fn to_role_weights(&self) -> Result<RoleWeights, AggregationError> {
        let total = BASIS_POINTS_TOTAL as f64;
        let supervisor_bp = (self.supervisor_weight * total).round() as i64;
        let examiner_panel_bp = (self.examiner_panel_weight * total).round() as i64;
        RoleWeights::new(supervisor_bp, examiner_panel_bp)
    }
}

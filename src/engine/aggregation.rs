// ==========================================
// 毕业论文管理系统 - 多评分人成绩汇总引擎
// ==========================================
// 红线: 纯函数, 相同输入必得相同输出, 无隐藏状态
// 红线: 评分不全时拒绝汇总, 不产生部分成绩
// ==========================================
// 规则:
// - 角色内: 每个评分项先在该角色评分人间取平均, 再对评分项取平均
// - 角色间: final = w_sup * 导师分 + w_panel * 评委组分
// - 权重以基点 (1/10000) 表示, 全程整数运算, 最终四舍五入 (half-up)
// ==========================================

use crate::domain::evaluation::{Evaluation, MAX_RUBRIC_SCORE, MIN_RUBRIC_SCORE};
use crate::domain::thesis::{DefenseOutcome, ThesisRecord};
use crate::domain::types::{GradeBand, RaterRole};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::instrument;

/// 权重基点总和
pub const BASIS_POINTS_TOTAL: i64 = 10_000;

/// 档位阈值
pub const DISTINCTION_THRESHOLD: i32 = 90;
pub const HIGH_PASS_THRESHOLD: i32 = 80;
pub const PASS_THRESHOLD: i32 = 60;
pub const REVISION_THRESHOLD: i32 = 45;

// ==========================================
// AggregationError - 汇总失败原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("评分不完整, 缺少评分人: {missing:?}")]
    IncompleteEvaluations { missing: Vec<String> },

    #[error("评分人不在答辩组或角色不符: rater_id={rater_id}")]
    UnexpectedRater { rater_id: String },

    #[error("评分人重复提交: rater_id={rater_id}")]
    DuplicateRater { rater_id: String },

    #[error("评分轮次不符: rater_id={rater_id}, expected={expected}, actual={actual}")]
    AttemptMismatch {
        rater_id: String,
        expected: i32,
        actual: i32,
    },

    #[error("评分项为空: rater_id={rater_id}")]
    EmptyRubric { rater_id: String },

    #[error("评分超出范围 [0, 100]: rater_id={rater_id}, item={item}, score={score}")]
    ScoreOutOfRange {
        rater_id: String,
        item: String,
        score: i32,
    },

    #[error("评委评分项不一致: rater_id={rater_id}, expected={expected:?}, actual={actual:?}")]
    RubricMismatch {
        rater_id: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("答辩组没有评委")]
    EmptyPanel,

    #[error("权重无效: supervisor={supervisor_bp}bp, examiner_panel={examiner_panel_bp}bp (两者须非负且合计 10000bp)")]
    InvalidWeights {
        supervisor_bp: i64,
        examiner_panel_bp: i64,
    },
}

// ==========================================
// RoleWeights - 角色权重 (基点)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleWeights {
    supervisor_bp: i64,
    examiner_panel_bp: i64,
}

impl RoleWeights {
    pub fn new(supervisor_bp: i64, examiner_panel_bp: i64) -> Result<Self, AggregationError> {
        if supervisor_bp < 0
            || examiner_panel_bp < 0
            || supervisor_bp + examiner_panel_bp != BASIS_POINTS_TOTAL
        {
            return Err(AggregationError::InvalidWeights {
                supervisor_bp,
                examiner_panel_bp,
            });
        }
        Ok(Self {
            supervisor_bp,
            examiner_panel_bp,
        })
    }

    pub fn supervisor_bp(&self) -> i64 {
        self.supervisor_bp
    }

    pub fn examiner_panel_bp(&self) -> i64 {
        self.examiner_panel_bp
    }
}

impl Default for RoleWeights {
    /// 默认 导师 30% / 评委组 70%
    fn default() -> Self {
        Self {
            supervisor_bp: 3_000,
            examiner_panel_bp: 7_000,
        }
    }
}

// ==========================================
// Panel - 答辩评分组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub supervisor_id: String,
    pub examiner_ids: Vec<String>,
}

impl Panel {
    /// 从论文角色分配构建; 未分配导师时返回 None
    pub fn from_thesis(thesis: &ThesisRecord) -> Option<Self> {
        thesis.supervisor_id.as_ref().map(|sup| Panel {
            supervisor_id: sup.clone(),
            examiner_ids: thesis.examiner_ids.clone(),
        })
    }

    /// 评分人在组内的角色
    pub fn role_of(&self, rater_id: &str) -> Option<RaterRole> {
        if self.supervisor_id == rater_id {
            Some(RaterRole::Supervisor)
        } else if self.examiner_ids.iter().any(|e| e == rater_id) {
            Some(RaterRole::Examiner)
        } else {
            None
        }
    }

    /// 全部必需评分人 (导师在前)
    pub fn required_raters(&self) -> Vec<&str> {
        std::iter::once(self.supervisor_id.as_str())
            .chain(self.examiner_ids.iter().map(|e| e.as_str()))
            .collect()
    }
}

/// 由分数判定档位与优秀标记
pub fn band_for(final_score: i32) -> (GradeBand, bool) {
    if final_score >= HIGH_PASS_THRESHOLD {
        (GradeBand::Passed, final_score >= DISTINCTION_THRESHOLD)
    } else if final_score >= PASS_THRESHOLD {
        (GradeBand::Passed, false)
    } else if final_score >= REVISION_THRESHOLD {
        (GradeBand::RevisionRequired, false)
    } else {
        (GradeBand::Failed, false)
    }
}

// ==========================================
// EvaluationAggregator - 成绩汇总器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationAggregator {
    weights: RoleWeights,
}

impl EvaluationAggregator {
    pub fn new(weights: RoleWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> RoleWeights {
        self.weights
    }

    /// 汇总一轮答辩的全部评分
    ///
    /// # 参数
    /// - `panel`: 导师 + 评委
    /// - `attempt_no`: 当前答辩轮次
    /// - `evaluations`: 本轮评分 (每位评分人一份)
    ///
    /// # 返回
    /// - `Ok(DefenseOutcome)`: 汇总结果
    /// - `Err(AggregationError)`: 评分不全或不合法
    #[instrument(skip(self, panel, evaluations), fields(count = evaluations.len()))]
    pub fn aggregate(
        &self,
        panel: &Panel,
        attempt_no: i32,
        evaluations: &[Evaluation],
    ) -> Result<DefenseOutcome, AggregationError> {
        if panel.examiner_ids.is_empty() {
            return Err(AggregationError::EmptyPanel);
        }

        // 1. 逐份校验
        let mut by_rater: BTreeMap<&str, &Evaluation> = BTreeMap::new();
        for evaluation in evaluations {
            validate_evaluation(panel, attempt_no, evaluation)?;
            if by_rater.insert(evaluation.rater_id.as_str(), evaluation).is_some() {
                return Err(AggregationError::DuplicateRater {
                    rater_id: evaluation.rater_id.clone(),
                });
            }
        }

        // 2. 完整性
        let missing: Vec<String> = panel
            .required_raters()
            .into_iter()
            .filter(|r| !by_rater.contains_key(r))
            .map(|r| r.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AggregationError::IncompleteEvaluations { missing });
        }

        // 3. 评委组评分项必须一致
        let examiner_evals: Vec<&Evaluation> = panel
            .examiner_ids
            .iter()
            .filter_map(|e| by_rater.get(e.as_str()).copied())
            .collect();
        let expected_items: BTreeSet<&String> = examiner_evals[0].rubric_scores.keys().collect();
        for evaluation in &examiner_evals[1..] {
            let actual: BTreeSet<&String> = evaluation.rubric_scores.keys().collect();
            if actual != expected_items {
                return Err(AggregationError::RubricMismatch {
                    rater_id: evaluation.rater_id.clone(),
                    expected: expected_items.iter().map(|s| s.to_string()).collect(),
                    actual: actual.iter().map(|s| s.to_string()).collect(),
                });
            }
        }

        let supervisor_eval = by_rater
            .get(panel.supervisor_id.as_str())
            .copied()
            .ok_or_else(|| AggregationError::IncompleteEvaluations {
                missing: vec![panel.supervisor_id.clone()],
            })?;

        // 4. 整数运算
        // 导师分 = sup_sum / n_s
        // 评委组分 = ex_total / (n_e * n_i)  (逐项平均再对项平均, 项集一致时二者相等)
        let sup_sum: i64 = supervisor_eval.rubric_scores.values().map(|v| *v as i64).sum();
        let n_s = supervisor_eval.rubric_scores.len() as i64;
        let ex_total: i64 = examiner_evals
            .iter()
            .flat_map(|e| e.rubric_scores.values())
            .map(|v| *v as i64)
            .sum();
        let n_e = examiner_evals.len() as i64;
        let n_i = expected_items.len() as i64;

        let numerator = self.weights.supervisor_bp * sup_sum * n_e * n_i
            + self.weights.examiner_panel_bp * ex_total * n_s;
        let denominator = BASIS_POINTS_TOTAL * n_s * n_e * n_i;
        let final_score = ((2 * numerator + denominator) / (2 * denominator)) as i32;

        let (band, distinction) = band_for(final_score);

        tracing::debug!(
            attempt_no,
            final_score,
            band = %band,
            "答辩成绩汇总完成"
        );

        Ok(DefenseOutcome {
            attempt_no,
            supervisor_score: sup_sum as f64 / n_s as f64,
            examiner_score: ex_total as f64 / (n_e * n_i) as f64,
            raw_score: numerator as f64 / denominator as f64,
            final_score,
            band,
            distinction,
        })
    }
}

/// 单份评分的合法性校验 (不依赖其他评分)
pub fn validate_evaluation(
    panel: &Panel,
    attempt_no: i32,
    evaluation: &Evaluation,
) -> Result<(), AggregationError> {
    if panel.role_of(&evaluation.rater_id) != Some(evaluation.rater_role) {
        return Err(AggregationError::UnexpectedRater {
            rater_id: evaluation.rater_id.clone(),
        });
    }
    if evaluation.attempt_no != attempt_no {
        return Err(AggregationError::AttemptMismatch {
            rater_id: evaluation.rater_id.clone(),
            expected: attempt_no,
            actual: evaluation.attempt_no,
        });
    }
    validate_rubric(&evaluation.rater_id, &evaluation.rubric_scores)
}

/// 评分项非空且每项在 [0, 100]
pub fn validate_rubric(rater_id: &str, rubric_scores: &BTreeMap<String, i32>) -> Result<(), AggregationError> {
    if rubric_scores.is_empty() {
        return Err(AggregationError::EmptyRubric {
            rater_id: rater_id.to_string(),
        });
    }
    if let Some((item, score)) = rubric_scores
        .iter()
        .find(|(_, s)| **s < MIN_RUBRIC_SCORE || **s > MAX_RUBRIC_SCORE)
    {
        return Err(AggregationError::ScoreOutOfRange {
            rater_id: rater_id.to_string(),
            item: item.clone(),
            score: *score,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn eval(rater: &str, role: RaterRole, scores: &[(&str, i32)]) -> Evaluation {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 20)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Evaluation {
            evaluation_id: format!("E-{}", rater),
            thesis_id: "T1".to_string(),
            rater_id: rater.to_string(),
            rater_role: role,
            attempt_no: 0,
            rubric_scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            remarks: None,
            submitted_at: ts,
            archived: false,
            updated_at: ts,
            version: 1,
        }
    }

    fn panel() -> Panel {
        Panel {
            supervisor_id: "SUP".to_string(),
            examiner_ids: vec!["EX1".to_string(), "EX2".to_string()],
        }
    }

    fn scenario_c() -> Vec<Evaluation> {
        vec![
            eval("EX1", RaterRole::Examiner, &[("content", 80), ("presentation", 75)]),
            eval("EX2", RaterRole::Examiner, &[("content", 70), ("presentation", 85)]),
            eval("SUP", RaterRole::Supervisor, &[("process", 90), ("report", 88)]),
        ]
    }

    #[test]
    fn test_scenario_c_weighted_score() {
        let aggregator = EvaluationAggregator::default();
        let outcome = aggregator.aggregate(&panel(), 0, &scenario_c()).unwrap();

        // 0.3 * 89 + 0.7 * 77.5 = 80.95
        assert_eq!(outcome.final_score, 81);
        assert_eq!(outcome.band, GradeBand::Passed);
        assert!(!outcome.distinction);
        assert!((outcome.raw_score - 80.95).abs() < 1e-9);
        assert!((outcome.supervisor_score - 89.0).abs() < 1e-9);
        assert!((outcome.examiner_score - 77.5).abs() < 1e-9);
    }

    #[test]
    fn test_aggregation_is_deterministic_and_order_independent() {
        let aggregator = EvaluationAggregator::default();
        let mut evals = scenario_c();
        let first = aggregator.aggregate(&panel(), 0, &evals).unwrap();
        evals.reverse();
        let second = aggregator.aggregate(&panel(), 0, &evals).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_round_half_up() {
        // 导师 50, 评委 51 (单评委), 权重 50/50 → 50.5 → 51
        let aggregator = EvaluationAggregator::new(RoleWeights::new(5_000, 5_000).unwrap());
        let panel = Panel {
            supervisor_id: "SUP".to_string(),
            examiner_ids: vec!["EX1".to_string()],
        };
        let evals = vec![
            eval("SUP", RaterRole::Supervisor, &[("a", 50)]),
            eval("EX1", RaterRole::Examiner, &[("a", 51)]),
        ];
        let outcome = aggregator.aggregate(&panel, 0, &evals).unwrap();
        assert_eq!(outcome.final_score, 51);
        assert_eq!(outcome.band, GradeBand::RevisionRequired);
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(band_for(90), (GradeBand::Passed, true));
        assert_eq!(band_for(89), (GradeBand::Passed, false));
        assert_eq!(band_for(80), (GradeBand::Passed, false));
        assert_eq!(band_for(60), (GradeBand::Passed, false));
        assert_eq!(band_for(59), (GradeBand::RevisionRequired, false));
        assert_eq!(band_for(45), (GradeBand::RevisionRequired, false));
        assert_eq!(band_for(44), (GradeBand::Failed, false));
    }

    #[test]
    fn test_incomplete_evaluations_rejected() {
        let aggregator = EvaluationAggregator::default();
        let evals: Vec<Evaluation> = scenario_c().into_iter().filter(|e| e.rater_id != "EX2").collect();
        let err = aggregator.aggregate(&panel(), 0, &evals).unwrap_err();
        assert_eq!(
            err,
            AggregationError::IncompleteEvaluations {
                missing: vec!["EX2".to_string()]
            }
        );
    }

    #[test]
    fn test_rubric_mismatch_and_out_of_range() {
        let aggregator = EvaluationAggregator::default();

        let mut evals = scenario_c();
        evals[1] = eval("EX2", RaterRole::Examiner, &[("content", 70), ("novelty", 85)]);
        assert!(matches!(
            aggregator.aggregate(&panel(), 0, &evals),
            Err(AggregationError::RubricMismatch { .. })
        ));

        let mut evals = scenario_c();
        evals[0] = eval("EX1", RaterRole::Examiner, &[("content", 101), ("presentation", 75)]);
        assert!(matches!(
            aggregator.aggregate(&panel(), 0, &evals),
            Err(AggregationError::ScoreOutOfRange { score: 101, .. })
        ));
    }

    #[test]
    fn test_unexpected_rater_rejected() {
        let aggregator = EvaluationAggregator::default();
        let mut evals = scenario_c();
        evals.push(eval("OUTSIDER", RaterRole::Examiner, &[("content", 70)]));
        assert!(matches!(
            aggregator.aggregate(&panel(), 0, &evals),
            Err(AggregationError::UnexpectedRater { .. })
        ));

        // 导师以评委身份提交同样视为不符
        let mut evals = scenario_c();
        evals[2].rater_role = RaterRole::Examiner;
        assert!(matches!(
            aggregator.aggregate(&panel(), 0, &evals),
            Err(AggregationError::UnexpectedRater { .. })
        ));
    }

    #[test]
    fn test_invalid_weights() {
        assert!(RoleWeights::new(3_000, 6_000).is_err());
        assert!(RoleWeights::new(-1, 10_001).is_err());
        assert_eq!(RoleWeights::default(), RoleWeights::new(3_000, 7_000).unwrap());
    }
}

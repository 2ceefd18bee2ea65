// ==========================================
// 配料批次执行系统 - 批次控制引擎
// ==========================================
// 职责: 投料记录、人工签核、作废、关闭判定
// 输入: 批次 + 缩放后的配料需求 + 质量门判定
// 输出: 变更后的批次 / 结构化拒绝原因
// ==========================================
// 红线: 任一配料有效投料量不得为负
// 红线: 关闭需 每种配料 ≥ 需求×容差 且 质量门放行
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::consumption::ConsumptionEntry;
use crate::domain::recipe::ScaledRequirement;
use crate::domain::types::{BatchStatus, ConsumptionKind};
use crate::engine::error::{CloseBlocker, CloseReport, ExecutionError, ExecutionResult};
use crate::engine::quality_gate::QualityVerdict;
use serde::{Deserialize, Serialize};

/// 浮点比较容差
pub(crate) const QUANTITY_EPSILON: f64 = 1e-9;

/// 默认投料完成容差 (需求量的 99.9%)
pub const DEFAULT_CONSUMPTION_TOLERANCE: f64 = 0.999;

// ==========================================
// ConsumptionCommand - 投料命令
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionCommand {
    pub ingredient_name: String,
    pub source_reference: String,
    pub quantity: f64, // 负数为退料
    pub kind: ConsumptionKind,
    pub operator: String,
}

impl ConsumptionCommand {
    pub fn manual(ingredient_name: &str, source_reference: &str, quantity: f64, operator: &str) -> Self {
        Self {
            ingredient_name: ingredient_name.to_string(),
            source_reference: source_reference.to_string(),
            quantity,
            kind: ConsumptionKind::Manual,
            operator: operator.to_string(),
        }
    }

    pub fn with_kind(mut self, kind: ConsumptionKind) -> Self {
        self.kind = kind;
        self
    }
}

// ==========================================
// IngredientProgress - 配料进度 (查询面)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientProgress {
    pub ingredient_name: String,
    pub required_quantity: f64,
    pub consumed_quantity: f64,
    pub shortfall: f64,
    /// 数量判定: 已投 ≥ 需求×容差
    pub within_tolerance: bool,
    /// 人工签核
    pub weighing_finished: bool,
}

// ==========================================
// BatchController - 批次控制引擎
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct BatchController {
    consumption_tolerance: f64,
}

impl Default for BatchController {
    fn default() -> Self {
        Self::new(DEFAULT_CONSUMPTION_TOLERANCE)
    }
}

impl BatchController {
    pub fn new(consumption_tolerance: f64) -> Self {
        Self {
            consumption_tolerance,
        }
    }

    pub fn consumption_tolerance(&self) -> f64 {
        self.consumption_tolerance
    }

    // ==========================================
    // 写入命令
    // ==========================================

    /// 记录投料
    ///
    /// # 规则
    /// - 批次必须在投料中
    /// - 配料必须属于配方
    /// - 负数视为对多录记录的冲正 (新增记录, 不修改旧记录)
    /// - 新的有效投料量不得为负
    pub fn record_consumption(
        &self,
        batch: &mut Batch,
        requirements: &[ScaledRequirement],
        command: ConsumptionCommand,
    ) -> ExecutionResult<ConsumptionEntry> {
        self.ensure_ongoing(batch)?;
        self.ensure_ingredient(requirements, &command.ingredient_name)?;

        if command.source_reference.trim().is_empty() {
            return Err(ExecutionError::Validation("来源批号不能为空".to_string()));
        }
        if !command.quantity.is_finite() || command.quantity.abs() <= QUANTITY_EPSILON {
            return Err(ExecutionError::Validation(format!(
                "投料数量无效: {}",
                command.quantity
            )));
        }

        let current = batch.ledger.effective_quantity(&command.ingredient_name);
        let next_total = current + command.quantity;
        if next_total < -QUANTITY_EPSILON {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "配料 {} 退料 {:.3}kg 超过有效投料量 {:.3}kg",
                command.ingredient_name,
                -command.quantity,
                current
            )));
        }

        let entry = ConsumptionEntry::new(
            &batch.batch_id,
            &command.ingredient_name,
            command.source_reference.trim(),
            command.quantity,
            command.kind,
            &command.operator,
        );
        batch.ledger.append(entry.clone());

        tracing::debug!(
            batch_id = %batch.batch_id,
            ingredient = %command.ingredient_name,
            quantity = command.quantity,
            effective = next_total,
            "投料已记录"
        );
        Ok(entry)
    }

    /// 人工签核 (与数量判定无关)
    pub fn set_weighing_finished(
        &self,
        batch: &mut Batch,
        requirements: &[ScaledRequirement],
        ingredient_name: &str,
        finished: bool,
    ) -> ExecutionResult<()> {
        self.ensure_ongoing(batch)?;
        self.ensure_ingredient(requirements, ingredient_name)?;

        if finished {
            batch.weighing_finished.insert(ingredient_name.to_string());
        } else {
            batch.weighing_finished.remove(ingredient_name);
        }
        Ok(())
    }

    /// 作废投料记录
    ///
    /// 逻辑作废, 记录保留; 同时撤销该配料的签核 (重新打开)
    pub fn annul(&self, batch: &mut Batch, entry_id: &str) -> ExecutionResult<ConsumptionEntry> {
        self.ensure_ongoing(batch)?;

        let entry = batch
            .ledger
            .find(entry_id)
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound {
                entity: "ConsumptionEntry".to_string(),
                id: entry_id.to_string(),
            })?;
        if entry.is_annulled {
            return Err(ExecutionError::Validation(format!(
                "投料记录 {} 已作废",
                entry_id
            )));
        }

        let remaining = batch
            .ledger
            .effective_quantity_without(&entry.ingredient_name, entry_id);
        if remaining < -QUANTITY_EPSILON {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "作废后配料 {} 有效投料量为负 ({:.3}kg), 请先作废对应的退料记录",
                entry.ingredient_name, remaining
            )));
        }

        batch.ledger.annul(entry_id);
        batch.weighing_finished.remove(&entry.ingredient_name);

        Ok(ConsumptionEntry {
            is_annulled: true,
            ..entry
        })
    }

    /// 请求关闭批次
    ///
    /// # 返回
    /// - `Ok(())`: 批次已转为 completed
    /// - `Err(CloseRejected)`: 全部阻断项
    pub fn request_close(
        &self,
        batch: &mut Batch,
        requirements: &[ScaledRequirement],
        verdict: &QualityVerdict,
    ) -> ExecutionResult<()> {
        let report = self.evaluate_close(batch, requirements, verdict);
        if !report.is_clear() {
            return Err(ExecutionError::CloseRejected(report));
        }

        batch.status = BatchStatus::Completed;
        batch.completed_at = Some(chrono::Utc::now().naive_utc());
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 关闭条件评估 (返回全部阻断项)
    pub fn evaluate_close(
        &self,
        batch: &Batch,
        requirements: &[ScaledRequirement],
        verdict: &QualityVerdict,
    ) -> CloseReport {
        let mut blockers = Vec::new();

        if batch.status != BatchStatus::Ongoing {
            blockers.push(CloseBlocker::BatchNotOngoing {
                status: batch.status,
            });
        }

        for progress in self.ingredient_progress(batch, requirements) {
            if !progress.within_tolerance {
                blockers.push(CloseBlocker::IngredientShort {
                    ingredient_name: progress.ingredient_name,
                    required_quantity: progress.required_quantity,
                    consumed_quantity: progress.consumed_quantity,
                    shortfall: progress.shortfall,
                });
            }
        }

        blockers.extend(verdict.blockers());

        CloseReport {
            batch_id: batch.batch_id.clone(),
            blockers,
        }
    }

    /// 每种配料的进度
    pub fn ingredient_progress(
        &self,
        batch: &Batch,
        requirements: &[ScaledRequirement],
    ) -> Vec<IngredientProgress> {
        requirements
            .iter()
            .map(|req| {
                let consumed = batch.ledger.effective_quantity(&req.ingredient_name);
                IngredientProgress {
                    ingredient_name: req.ingredient_name.clone(),
                    required_quantity: req.required_quantity,
                    consumed_quantity: consumed,
                    shortfall: (req.required_quantity - consumed).max(0.0),
                    within_tolerance: self.is_within_tolerance(req.required_quantity, consumed),
                    weighing_finished: batch.is_weighing_finished(&req.ingredient_name),
                }
            })
            .collect()
    }

    /// 某配料的未满足量
    pub fn shortfall(
        &self,
        batch: &Batch,
        requirements: &[ScaledRequirement],
        ingredient_name: &str,
    ) -> Option<f64> {
        requirements
            .iter()
            .find(|r| r.ingredient_name == ingredient_name)
            .map(|r| {
                (r.required_quantity - batch.ledger.effective_quantity(ingredient_name)).max(0.0)
            })
    }

    fn is_within_tolerance(&self, required: f64, consumed: f64) -> bool {
        consumed + QUANTITY_EPSILON >= required * self.consumption_tolerance
    }

    fn ensure_ongoing(&self, batch: &Batch) -> ExecutionResult<()> {
        if batch.status != BatchStatus::Ongoing {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可操作",
                batch.batch_number, batch.status
            )));
        }
        Ok(())
    }

    fn ensure_ingredient(
        &self,
        requirements: &[ScaledRequirement],
        ingredient_name: &str,
    ) -> ExecutionResult<()> {
        if ingredient_name.trim().is_empty() {
            return Err(ExecutionError::Validation("配料名不能为空".to_string()));
        }
        if !requirements.iter().any(|r| r.ingredient_name == ingredient_name) {
            return Err(ExecutionError::Validation(format!(
                "配料 {} 不在配方需求中",
                ingredient_name
            )));
        }
        Ok(())
    }
}

// ==========================================
// 配料批次执行系统 - 纠偏工单引擎
// ==========================================
// 状态机: planned → material_picking → processing → completed
//         任一非终态 → cancelled
// 触发: 批次 NIRS 结果为 nok
// 红线: 每个批次同时至多一张未终结工单
// 红线: 已拣量不得超过需求量
// ==========================================

use crate::domain::adjustment::{AdjustmentMaterial, AdjustmentOrder};
use crate::domain::batch::Batch;
use crate::domain::consumption::ConsumptionEntry;
use crate::domain::types::{AdjustmentStatus, BatchStatus, ConsumptionKind, NirsStatus};
use crate::engine::batch_controller::QUANTITY_EPSILON;
use crate::engine::error::{ExecutionError, ExecutionResult};
use crate::engine::quality_gate::QualityGate;

/// 默认备料完成容差
pub const DEFAULT_PICK_TOLERANCE: f64 = 0.999;

// ==========================================
// AdjustmentWorkflow - 纠偏工单引擎
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct AdjustmentWorkflow {
    pick_tolerance: f64,
}

impl Default for AdjustmentWorkflow {
    fn default() -> Self {
        Self::new(DEFAULT_PICK_TOLERANCE)
    }
}

impl AdjustmentWorkflow {
    pub fn new(pick_tolerance: f64) -> Self {
        Self { pick_tolerance }
    }

    /// 创建纠偏工单
    ///
    /// # 参数
    /// - `existing`: 该批次的全部历史工单
    ///
    /// # 规则
    /// - 批次在投料中
    /// - 批次 NIRS 为 nok, 且当前结果尚未被治愈
    /// - 批次无未终结工单
    /// - 物料行非空, 需求量为正
    pub fn create(
        &self,
        batch: &Batch,
        existing: &[AdjustmentOrder],
        materials: Vec<AdjustmentMaterial>,
        operator: &str,
    ) -> ExecutionResult<AdjustmentOrder> {
        if batch.status != BatchStatus::Ongoing {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可创建纠偏工单",
                batch.batch_number, batch.status
            )));
        }
        if batch.confirmation.nirs != NirsStatus::Nok {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 的 NIRS 结果为 {}, 仅不合格批次可创建纠偏工单",
                batch.batch_number, batch.confirmation.nirs
            )));
        }
        if let Some(active) = existing
            .iter()
            .find(|a| a.batch_id == batch.batch_id && a.is_active())
        {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 已有未完成的纠偏工单 {}",
                batch.batch_number, active.adjustment_id
            )));
        }
        if QualityGate::new().healing_order(batch, existing).is_some() {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 当前 NIRS 结果已完成纠偏, 请先复检",
                batch.batch_number
            )));
        }

        if materials.is_empty() {
            return Err(ExecutionError::Validation(
                "纠偏工单至少需要一行物料".to_string(),
            ));
        }
        for m in &materials {
            if m.ingredient_name.trim().is_empty() || m.source_reference.trim().is_empty() {
                return Err(ExecutionError::Validation(
                    "纠偏物料的配料名与来源批号不能为空".to_string(),
                ));
            }
            if !m.required_quantity.is_finite() || m.required_quantity <= 0.0 {
                return Err(ExecutionError::Validation(format!(
                    "纠偏物料 {} 需求量无效: {}",
                    m.ingredient_name, m.required_quantity
                )));
            }
        }

        Ok(AdjustmentOrder {
            adjustment_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            status: AdjustmentStatus::Planned,
            materials: materials
                .into_iter()
                .map(|m| AdjustmentMaterial {
                    picked_quantity: 0.0,
                    ..m
                })
                .collect(),
            staging_location: None,
            nirs_sequence: batch.confirmation.nirs_sequence,
            created_by: operator.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        })
    }

    /// 分配暂存位 (planned → material_picking)
    pub fn assign_staging(&self, order: &mut AdjustmentOrder, location: &str) -> ExecutionResult<()> {
        if order.status != AdjustmentStatus::Planned {
            return Err(ExecutionError::transition(
                "AdjustmentOrder",
                order.status,
                AdjustmentStatus::MaterialPicking,
            ));
        }
        if location.trim().is_empty() {
            return Err(ExecutionError::Validation("暂存位不能为空".to_string()));
        }

        order.staging_location = Some(location.trim().to_string());
        order.status = AdjustmentStatus::MaterialPicking;
        Ok(())
    }

    /// 登记拣料
    ///
    /// 全部物料行达到容差后自动进入 processing
    pub fn pick(
        &self,
        order: &mut AdjustmentOrder,
        material_index: usize,
        quantity: f64,
    ) -> ExecutionResult<()> {
        if order.status != AdjustmentStatus::MaterialPicking {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "纠偏工单 {} 状态为 {}, 仅备料中可拣料",
                order.adjustment_id, order.status
            )));
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ExecutionError::Validation(format!(
                "拣料数量无效: {}",
                quantity
            )));
        }

        let material = order
            .materials
            .get_mut(material_index)
            .ok_or_else(|| ExecutionError::NotFound {
                entity: "AdjustmentMaterial".to_string(),
                id: material_index.to_string(),
            })?;

        let next = material.picked_quantity + quantity;
        if next > material.required_quantity + QUANTITY_EPSILON {
            return Err(ExecutionError::Validation(format!(
                "物料 {} 拣料超量: 需求 {:.3}kg, 剩余 {:.3}kg, 本次 {:.3}kg",
                material.ingredient_name,
                material.required_quantity,
                material.remaining_quantity(),
                quantity
            )));
        }
        material.picked_quantity = next.min(material.required_quantity);

        if self.is_fully_picked(order) {
            order.status = AdjustmentStatus::Processing;
            tracing::debug!(adjustment_id = %order.adjustment_id, "纠偏物料备齐");
        }
        Ok(())
    }

    /// 全部物料行是否达到备料容差
    pub fn is_fully_picked(&self, order: &AdjustmentOrder) -> bool {
        order.materials.iter().all(|m| {
            m.picked_quantity + QUANTITY_EPSILON >= m.required_quantity * self.pick_tolerance
        })
    }

    /// 合并投料 (processing → completed)
    ///
    /// 以已拣量生成 adjustment 类型的投料记录, 追加到批次台账
    pub fn consume(
        &self,
        order: &mut AdjustmentOrder,
        batch: &mut Batch,
        operator: &str,
    ) -> ExecutionResult<Vec<ConsumptionEntry>> {
        if order.status != AdjustmentStatus::Processing {
            return Err(ExecutionError::transition(
                "AdjustmentOrder",
                order.status,
                AdjustmentStatus::Completed,
            ));
        }
        if order.batch_id != batch.batch_id {
            return Err(ExecutionError::Validation(format!(
                "纠偏工单 {} 不属于批次 {}",
                order.adjustment_id, batch.batch_id
            )));
        }
        if batch.status != BatchStatus::Ongoing {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可合并纠偏物料",
                batch.batch_number, batch.status
            )));
        }

        let entries: Vec<ConsumptionEntry> = order
            .materials
            .iter()
            .filter(|m| m.picked_quantity > QUANTITY_EPSILON)
            .map(|m| {
                ConsumptionEntry::new(
                    &batch.batch_id,
                    &m.ingredient_name,
                    &m.source_reference,
                    m.picked_quantity,
                    ConsumptionKind::Adjustment,
                    operator,
                )
                .with_adjustment(&order.adjustment_id)
            })
            .collect();

        for entry in &entries {
            batch.ledger.append(entry.clone());
        }
        order.status = AdjustmentStatus::Completed;
        order.completed_at = Some(chrono::Utc::now().naive_utc());
        Ok(entries)
    }

    /// 取消工单 (任一非终态)
    pub fn cancel(&self, order: &mut AdjustmentOrder) -> ExecutionResult<()> {
        if order.status.is_terminal() {
            return Err(ExecutionError::transition(
                "AdjustmentOrder",
                order.status,
                AdjustmentStatus::Cancelled,
            ));
        }
        order.status = AdjustmentStatus::Cancelled;
        order.completed_at = Some(chrono::Utc::now().naive_utc());
        Ok(())
    }
}

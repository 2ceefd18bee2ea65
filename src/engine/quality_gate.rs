// ==========================================
// 配料批次执行系统 - 质量门引擎
// ==========================================
// 两个独立确认: NIRS 分析放行 + 物理取样
// - NIRS: pending / ok / nok, nok 是纠偏工单的唯一触发条件
// - 取样: pending / ok, 无失败态, 由化验协作方推送
// 红线: nok 不阻断投料, 只阻断批次关闭
// ==========================================

use crate::domain::adjustment::AdjustmentOrder;
use crate::domain::batch::Batch;
use crate::domain::types::{BatchStatus, NirsStatus, SamplingStatus};
use crate::engine::error::{CloseBlocker, ExecutionError, ExecutionResult};

// ==========================================
// NirsResolution - NIRS 放行判定
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum NirsResolution {
    Pending,
    Passed,
    /// 不合格,但当前结果已有完成的纠偏工单
    Healed { adjustment_id: String },
    Rejected { active_adjustment_id: Option<String> },
}

/// 质量门判定结果
#[derive(Debug, Clone, PartialEq)]
pub struct QualityVerdict {
    pub nirs: NirsResolution,
    pub sampling: SamplingStatus,
}

impl QualityVerdict {
    pub fn is_released(&self) -> bool {
        matches!(
            self.nirs,
            NirsResolution::Passed | NirsResolution::Healed { .. }
        ) && self.sampling == SamplingStatus::Ok
    }

    /// 转换为关闭阻断项
    pub fn blockers(&self) -> Vec<CloseBlocker> {
        let mut blockers = Vec::new();
        match &self.nirs {
            NirsResolution::Pending => blockers.push(CloseBlocker::NirsPending),
            NirsResolution::Rejected {
                active_adjustment_id,
            } => blockers.push(CloseBlocker::NirsRejected {
                nirs: NirsStatus::Nok,
                active_adjustment_id: active_adjustment_id.clone(),
            }),
            NirsResolution::Passed | NirsResolution::Healed { .. } => {}
        }
        if self.sampling != SamplingStatus::Ok {
            blockers.push(CloseBlocker::SamplingPending);
        }
        blockers
    }
}

// ==========================================
// QualityGate - 质量门
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate;

impl QualityGate {
    pub fn new() -> Self {
        Self
    }

    /// 查找治愈当前 NIRS 结果的纠偏工单
    ///
    /// 注意: 这是一条刻意保留的隐式规则。
    /// NIRS 记录值保持 nok 不变 (保留原始化验结果用于审计),
    /// "存在针对本次结果的已完成纠偏工单" 这一事实本身即视为放行信号。
    pub fn healing_order<'a>(
        &self,
        batch: &Batch,
        adjustments: &'a [AdjustmentOrder],
    ) -> Option<&'a AdjustmentOrder> {
        if batch.confirmation.nirs != NirsStatus::Nok {
            return None;
        }
        adjustments.iter().find(|a| {
            a.batch_id == batch.batch_id
                && a.is_completed()
                && a.nirs_sequence == batch.confirmation.nirs_sequence
        })
    }

    /// 判定质量门
    pub fn evaluate(&self, batch: &Batch, adjustments: &[AdjustmentOrder]) -> QualityVerdict {
        let nirs = match batch.confirmation.nirs {
            NirsStatus::Pending => NirsResolution::Pending,
            NirsStatus::Ok => NirsResolution::Passed,
            NirsStatus::Nok => match self.healing_order(batch, adjustments) {
                Some(order) => NirsResolution::Healed {
                    adjustment_id: order.adjustment_id.clone(),
                },
                None => NirsResolution::Rejected {
                    active_adjustment_id: adjustments
                        .iter()
                        .find(|a| a.batch_id == batch.batch_id && a.is_active())
                        .map(|a| a.adjustment_id.clone()),
                },
            },
        };

        QualityVerdict {
            nirs,
            sampling: batch.confirmation.sampling,
        }
    }

    /// 记录 NIRS 结果
    ///
    /// # 规则
    /// - 结果只能是 ok / nok
    /// - 每批次只能写入一次; 当前结果被已完成纠偏工单治愈后允许复检写入
    pub fn set_nirs(
        &self,
        batch: &mut Batch,
        result: NirsStatus,
        adjustments: &[AdjustmentOrder],
    ) -> ExecutionResult<()> {
        if result == NirsStatus::Pending {
            return Err(ExecutionError::Validation(
                "NIRS 结果必须为 ok 或 nok".to_string(),
            ));
        }
        if batch.status != BatchStatus::Ongoing {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可写入 NIRS 结果",
                batch.batch_number, batch.status
            )));
        }

        let current = batch.confirmation.nirs;
        let retest_allowed = self.healing_order(batch, adjustments).is_some();
        if current != NirsStatus::Pending && !retest_allowed {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 的 NIRS 结果已记录为 {}",
                batch.batch_number, current
            )));
        }

        batch.confirmation.nirs = result;
        batch.confirmation.nirs_sequence += 1;
        Ok(())
    }

    /// 记录取样完成 (只允许一次, 批次须在投料中)
    pub fn set_sampling_ok(&self, batch: &mut Batch) -> ExecutionResult<()> {
        if batch.status != BatchStatus::Ongoing {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可写入取样状态",
                batch.batch_number, batch.status
            )));
        }
        if batch.confirmation.sampling == SamplingStatus::Ok {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 已取样",
                batch.batch_number
            )));
        }
        batch.confirmation.sampling = SamplingStatus::Ok;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::AdjustmentStatus;

    fn ongoing_batch() -> Batch {
        let mut batch = Batch::new("RUN1", 1, 500.0);
        batch.status = BatchStatus::Ongoing;
        batch
    }

    fn order(batch: &Batch, status: AdjustmentStatus) -> AdjustmentOrder {
        AdjustmentOrder {
            adjustment_id: "ADJ1".to_string(),
            batch_id: batch.batch_id.clone(),
            status,
            materials: vec![],
            staging_location: None,
            nirs_sequence: batch.confirmation.nirs_sequence,
            created_by: "qa".to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        }
    }

    #[test]
    fn test_fields_are_independent() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();

        gate.set_sampling_ok(&mut batch).unwrap();
        let verdict = gate.evaluate(&batch, &[]);
        assert_eq!(verdict.nirs, NirsResolution::Pending);
        assert!(!verdict.is_released());
        assert_eq!(verdict.blockers(), vec![CloseBlocker::NirsPending]);

        gate.set_nirs(&mut batch, NirsStatus::Ok, &[]).unwrap();
        assert!(gate.evaluate(&batch, &[]).is_released());
    }

    #[test]
    fn test_fields_settable_once() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();

        gate.set_nirs(&mut batch, NirsStatus::Ok, &[]).unwrap();
        assert!(gate.set_nirs(&mut batch, NirsStatus::Nok, &[]).is_err());

        gate.set_sampling_ok(&mut batch).unwrap();
        assert!(gate.set_sampling_ok(&mut batch).is_err());
    }

    #[test]
    fn test_pending_is_not_a_result() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();
        let err = gate
            .set_nirs(&mut batch, NirsStatus::Pending, &[])
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Validation(_)));
    }

    #[test]
    fn test_completed_adjustment_heals_nok() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();
        gate.set_nirs(&mut batch, NirsStatus::Nok, &[]).unwrap();
        gate.set_sampling_ok(&mut batch).unwrap();

        let active = order(&batch, AdjustmentStatus::MaterialPicking);
        let verdict = gate.evaluate(&batch, std::slice::from_ref(&active));
        assert_eq!(
            verdict.nirs,
            NirsResolution::Rejected {
                active_adjustment_id: Some("ADJ1".to_string())
            }
        );

        let done = order(&batch, AdjustmentStatus::Completed);
        let verdict = gate.evaluate(&batch, std::slice::from_ref(&done));
        assert!(verdict.is_released());
        // 原始化验结果保持不变
        assert_eq!(batch.confirmation.nirs, NirsStatus::Nok);
    }

    #[test]
    fn test_cancelled_adjustment_does_not_heal() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();
        gate.set_nirs(&mut batch, NirsStatus::Nok, &[]).unwrap();

        let cancelled = order(&batch, AdjustmentStatus::Cancelled);
        let verdict = gate.evaluate(&batch, std::slice::from_ref(&cancelled));
        assert_eq!(
            verdict.nirs,
            NirsResolution::Rejected {
                active_adjustment_id: None
            }
        );
    }

    #[test]
    fn test_retest_after_healing_starts_new_sequence() {
        let gate = QualityGate::new();
        let mut batch = ongoing_batch();
        gate.set_nirs(&mut batch, NirsStatus::Nok, &[]).unwrap();
        let done = order(&batch, AdjustmentStatus::Completed);

        // 纠偏完成后允许复检, 复检再次不合格则旧工单不再治愈
        gate.set_nirs(&mut batch, NirsStatus::Nok, std::slice::from_ref(&done))
            .unwrap();
        assert_eq!(batch.confirmation.nirs_sequence, 2);
        assert!(gate.healing_order(&batch, std::slice::from_ref(&done)).is_none());
    }

    #[test]
    fn test_quality_writes_require_ongoing_batch() {
        let gate = QualityGate::new();

        for status in [BatchStatus::Planned, BatchStatus::Completed] {
            let mut batch = Batch::new("RUN1", 2, 500.0);
            batch.status = status;

            let err = gate.set_nirs(&mut batch, NirsStatus::Nok, &[]).unwrap_err();
            assert!(matches!(err, ExecutionError::BusinessRuleViolation(_)));
            let err = gate.set_sampling_ok(&mut batch).unwrap_err();
            assert!(matches!(err, ExecutionError::BusinessRuleViolation(_)));

            assert_eq!(batch.confirmation.nirs, NirsStatus::Pending);
            assert_eq!(batch.confirmation.nirs_sequence, 0);
            assert_eq!(batch.confirmation.sampling, SamplingStatus::Pending);
        }
    }
}

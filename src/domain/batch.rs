// ==========================================
// 配料批次执行系统 - 批次领域模型
// ==========================================
// 批次: 生产任务内的一个执行单元,拥有独立台账与质量门
// 双标记设计: weighing_finished (人工签核) 与数量容差判定相互独立
// ==========================================

use crate::domain::consumption::ConsumptionLedger;
use crate::domain::types::{BatchStatus, NirsStatus, SamplingStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ConfirmationStatus - 质量确认状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationStatus {
    pub nirs: NirsStatus,
    pub sampling: SamplingStatus,
    /// NIRS 结果序号: 每次写入 +1, 纠偏工单据此关联其纠正的那次结果
    pub nirs_sequence: u32,
}

impl Default for ConfirmationStatus {
    fn default() -> Self {
        Self {
            nirs: NirsStatus::Pending,
            sampling: SamplingStatus::Pending,
            nirs_sequence: 0,
        }
    }
}

// ==========================================
// Batch - 批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub run_id: String,
    pub batch_number: u32, // 从 1 开始连续编号
    pub target_weight: f64,
    pub status: BatchStatus,
    pub confirmation: ConfirmationStatus,
    pub weighing_finished: BTreeSet<String>,
    pub ledger: ConsumptionLedger,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

impl Batch {
    pub fn new(run_id: &str, batch_number: u32, target_weight: f64) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            batch_number,
            target_weight,
            status: BatchStatus::Planned,
            confirmation: ConfirmationStatus::default(),
            weighing_finished: BTreeSet::new(),
            ledger: ConsumptionLedger::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_ongoing(&self) -> bool {
        self.status == BatchStatus::Ongoing
    }

    pub fn is_weighing_finished(&self, ingredient_name: &str) -> bool {
        self.weighing_finished.contains(ingredient_name)
    }
}

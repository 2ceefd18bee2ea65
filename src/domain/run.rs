// ==========================================
// 配料批次执行系统 - 生产任务领域模型
// ==========================================
// 红线: 同一任务内任意时刻至多一个批次处于 ongoing
// 批次在初始化时创建,之后不重排
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::production_event::ProductionEvent;
use crate::domain::types::{BatchStatus, RunStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Run - 生产任务 (父订单)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub recipe_id: String,
    pub target_total_weight: f64,
    pub batch_size: f64,
    pub status: RunStatus,
    pub batches: Vec<Batch>,
    #[serde(default)]
    pub events: Vec<ProductionEvent>,
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl Run {
    pub fn ongoing_batch(&self) -> Option<&Batch> {
        self.batches.iter().find(|b| b.status == BatchStatus::Ongoing)
    }

    pub fn batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    pub fn completed_batch_count(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Completed)
            .count()
    }

    /// 全部批次的有效投料总重
    pub fn total_consumed_weight(&self) -> f64 {
        self.batches
            .iter()
            .map(|b| b.ledger.effective_total_weight())
            .sum()
    }
}

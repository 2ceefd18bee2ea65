// ==========================================
// 配料批次执行系统 - 纠偏工单领域模型
// ==========================================
// 触发: NIRS 判定不合格 (nok)
// 约束: picked_quantity 永不超过 required_quantity
// 约束: 每个批次同时至多一张未终结工单
// ==========================================

use crate::domain::types::AdjustmentStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// AdjustmentMaterial - 纠偏物料行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentMaterial {
    pub ingredient_name: String,
    pub required_quantity: f64,
    pub picked_quantity: f64,
    pub source_reference: String,
}

impl AdjustmentMaterial {
    pub fn new(ingredient_name: &str, required_quantity: f64, source_reference: &str) -> Self {
        Self {
            ingredient_name: ingredient_name.to_string(),
            required_quantity,
            picked_quantity: 0.0,
            source_reference: source_reference.to_string(),
        }
    }

    /// 剩余待拣量
    pub fn remaining_quantity(&self) -> f64 {
        (self.required_quantity - self.picked_quantity).max(0.0)
    }
}

// ==========================================
// AdjustmentOrder - 纠偏工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentOrder {
    pub adjustment_id: String,
    pub batch_id: String,
    pub status: AdjustmentStatus,
    pub materials: Vec<AdjustmentMaterial>,
    pub staging_location: Option<String>, // 暂存位 (如贴标容器)
    pub nirs_sequence: u32,               // 所纠正的 NIRS 结果序号
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

impl AdjustmentOrder {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == AdjustmentStatus::Completed
    }
}

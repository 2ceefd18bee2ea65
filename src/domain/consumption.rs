// ==========================================
// 配料批次执行系统 - 投料台账
// ==========================================
// 红线: 台账只追加,作废为逻辑标记,不做物理删除
// 有效投料量 = 未作废记录的数量之和 (按需折叠,不维护累计计数器)
// ==========================================

use crate::domain::types::ConsumptionKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// ConsumptionEntry - 投料记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    pub entry_id: String,
    pub batch_id: String,
    pub ingredient_name: String,
    pub source_reference: String, // 托盘/批号
    pub quantity: f64,            // 带符号: 负数为退料
    pub kind: ConsumptionKind,
    pub adjustment_id: Option<String>, // 纠偏工单合并时填写
    pub is_annulled: bool,
    pub recorded_at: NaiveDateTime,
    pub recorded_by: String,
}

impl ConsumptionEntry {
    pub fn new(
        batch_id: &str,
        ingredient_name: &str,
        source_reference: &str,
        quantity: f64,
        kind: ConsumptionKind,
        recorded_by: &str,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            ingredient_name: ingredient_name.to_string(),
            source_reference: source_reference.to_string(),
            quantity,
            kind,
            adjustment_id: None,
            is_annulled: false,
            recorded_at: chrono::Utc::now().naive_utc(),
            recorded_by: recorded_by.to_string(),
        }
    }

    /// 标记为纠偏工单合并的记录
    pub fn with_adjustment(mut self, adjustment_id: &str) -> Self {
        self.adjustment_id = Some(adjustment_id.to_string());
        self
    }
}

// ==========================================
// ConsumptionLedger - 投料台账
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumptionLedger {
    entries: Vec<ConsumptionEntry>,
}

impl ConsumptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ConsumptionEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ConsumptionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, entry: ConsumptionEntry) {
        self.entries.push(entry);
    }

    pub fn find(&self, entry_id: &str) -> Option<&ConsumptionEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    /// 逻辑作废; 返回被作废的记录
    pub fn annul(&mut self, entry_id: &str) -> Option<&ConsumptionEntry> {
        let entry = self.entries.iter_mut().find(|e| e.entry_id == entry_id)?;
        entry.is_annulled = true;
        Some(&*entry)
    }

    /// 某配料的有效投料量
    pub fn effective_quantity(&self, ingredient_name: &str) -> f64 {
        self.entries
            .iter()
            .filter(|e| !e.is_annulled && e.ingredient_name == ingredient_name)
            .map(|e| e.quantity)
            .sum()
    }

    /// 排除某条记录后的有效投料量 (作废前校验用)
    pub fn effective_quantity_without(&self, ingredient_name: &str, entry_id: &str) -> f64 {
        self.entries
            .iter()
            .filter(|e| {
                !e.is_annulled && e.ingredient_name == ingredient_name && e.entry_id != entry_id
            })
            .map(|e| e.quantity)
            .sum()
    }

    /// 全部配料的有效投料量
    pub fn effective_totals(&self) -> HashMap<String, f64> {
        self.entries
            .iter()
            .filter(|e| !e.is_annulled)
            .fold(HashMap::new(), |mut acc, e| {
                *acc.entry(e.ingredient_name.clone()).or_insert(0.0) += e.quantity;
                acc
            })
    }

    /// 有效投料总重
    pub fn effective_total_weight(&self) -> f64 {
        self.entries
            .iter()
            .filter(|e| !e.is_annulled)
            .map(|e| e.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ingredient: &str, qty: f64) -> ConsumptionEntry {
        ConsumptionEntry::new("B1", ingredient, "P-01", qty, ConsumptionKind::Manual, "op")
    }

    #[test]
    fn test_effective_quantity_skips_annulled() {
        let mut ledger = ConsumptionLedger::new();
        let first = entry("A", 100.0);
        let first_id = first.entry_id.clone();
        ledger.append(first);
        ledger.append(entry("A", 50.0));
        ledger.append(entry("B", 20.0));

        assert_eq!(ledger.effective_quantity("A"), 150.0);

        ledger.annul(&first_id);
        assert_eq!(ledger.effective_quantity("A"), 50.0);
        // 作废后记录仍保留
        assert_eq!(ledger.len(), 3);
        assert!(ledger.find(&first_id).map(|e| e.is_annulled).unwrap_or(false));
    }

    #[test]
    fn test_returns_reduce_total() {
        let mut ledger = ConsumptionLedger::new();
        ledger.append(entry("A", 120.0));
        ledger.append(entry("A", -20.0));

        let totals = ledger.effective_totals();
        assert_eq!(totals.get("A").copied(), Some(100.0));
        assert_eq!(ledger.effective_total_weight(), 100.0);
    }

    #[test]
    fn test_effective_quantity_without_entry() {
        let mut ledger = ConsumptionLedger::new();
        let positive = entry("A", 30.0);
        let positive_id = positive.entry_id.clone();
        ledger.append(positive);
        ledger.append(entry("A", -10.0));

        assert_eq!(ledger.effective_quantity_without("A", &positive_id), -10.0);
    }
}

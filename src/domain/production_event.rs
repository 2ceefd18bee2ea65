// ==========================================
// 配料批次执行系统 - 生产事件
// ==========================================
// 用户录入的生产备注 (停机/问题/交接班...),与状态机无耦合
// 只追加; 仅允许显式删除
// ==========================================

use crate::domain::types::ProductionEventType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEvent {
    pub event_id: String,
    pub run_id: String,
    pub event_type: ProductionEventType,
    pub description: String,
    pub occurred_at: NaiveDateTime,
    pub author: String,
}

impl ProductionEvent {
    pub fn new(
        run_id: &str,
        event_type: ProductionEventType,
        description: &str,
        author: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            event_type,
            description: description.to_string(),
            occurred_at: chrono::Utc::now().naive_utc(),
            author: author.to_string(),
        }
    }
}

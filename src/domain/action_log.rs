// ==========================================
// 配料批次执行系统 - 操作日志领域模型
// ==========================================
// 红线: 所有被接受的写入命令必须记录
// 用途: 审计追踪 (谁在何时对哪个任务/批次做了什么)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub run_id: Option<String>,
    pub batch_id: Option<String>,
    pub action_type: String, // 存储为字符串
    pub action_ts: NaiveDateTime,
    pub actor: String,

    // ===== 操作负载 =====
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    ImportRecipe,
    InitializeRun,
    StartBatch,
    PauseRun,
    ResumeRun,
    CloseRun,
    RecordConsumption,
    AnnulConsumption,
    SetWeighingFinished,
    SetNirs,
    SetSampling,
    CloseBatch,
    // ===== 纠偏工单 =====
    CreateAdjustment,
    AssignStaging,
    PickAdjustment,
    ConsumeAdjustment,
    CancelAdjustment,
    // ===== 生产事件 =====
    AddProductionEvent,
    DeleteProductionEvent,
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ImportRecipe => "ImportRecipe",
            ActionType::InitializeRun => "InitializeRun",
            ActionType::StartBatch => "StartBatch",
            ActionType::PauseRun => "PauseRun",
            ActionType::ResumeRun => "ResumeRun",
            ActionType::CloseRun => "CloseRun",
            ActionType::RecordConsumption => "RecordConsumption",
            ActionType::AnnulConsumption => "AnnulConsumption",
            ActionType::SetWeighingFinished => "SetWeighingFinished",
            ActionType::SetNirs => "SetNirs",
            ActionType::SetSampling => "SetSampling",
            ActionType::CloseBatch => "CloseBatch",
            ActionType::CreateAdjustment => "CreateAdjustment",
            ActionType::AssignStaging => "AssignStaging",
            ActionType::PickAdjustment => "PickAdjustment",
            ActionType::ConsumeAdjustment => "ConsumeAdjustment",
            ActionType::CancelAdjustment => "CancelAdjustment",
            ActionType::AddProductionEvent => "AddProductionEvent",
            ActionType::DeleteProductionEvent => "DeleteProductionEvent",
        }
    }
}

impl ActionLog {
    /// 创建新的操作日志
    pub fn new(action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            run_id: None,
            batch_id: None,
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Utc::now().naive_utc(),
            actor: actor.to_string(),
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch_id = Some(batch_id.to_string());
        self
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

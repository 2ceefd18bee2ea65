// ==========================================
// 配料批次执行系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod adjustment;
pub mod batch;
pub mod consumption;
pub mod production_event;
pub mod recipe;
pub mod run;
pub mod source_material;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use adjustment::{AdjustmentMaterial, AdjustmentOrder};
pub use batch::{Batch, ConfirmationStatus};
pub use consumption::{ConsumptionEntry, ConsumptionLedger};
pub use production_event::ProductionEvent;
pub use recipe::{Recipe, RecipeIngredient, ScaledRequirement};
pub use run::Run;
pub use source_material::SourceMaterial;
pub use types::{
    AdjustmentStatus, BatchStatus, ConsumptionKind, NirsStatus, ProductionEventType, RunStatus,
    SamplingStatus,
};

// ==========================================
// 配料批次执行系统 - 引擎层
// ==========================================
// 职责: 实现批次执行规则, 不拼 SQL
// 红线: Engine 不拼 SQL, 所有拒绝必须输出原因
// ==========================================

pub mod adjustment_workflow;
pub mod auto_weigh;
pub mod batch_controller;
pub mod collaborators;
pub mod error;
pub mod processing;
pub mod quality_gate;
pub mod recipe_scaler;
pub mod run_lifecycle;

// 重导出核心引擎
pub use adjustment_workflow::AdjustmentWorkflow;
pub use auto_weigh::{
    AutoWeighLoop, AutoWeighReport, AutoWeighStop, SimulatedScale, WeighingDevice,
    WeighingReading, WeighingStation,
};
pub use batch_controller::{BatchController, ConsumptionCommand, IngredientProgress};
pub use collaborators::{RecipeLookup, SourceMaterialLookup};
pub use error::{CloseBlocker, CloseReport, ExecutionError, ExecutionResult};
pub use processing::{KeyedLocks, ProcessingGuard, ProcessingMarkers};
pub use quality_gate::{NirsResolution, QualityGate, QualityVerdict};
pub use recipe_scaler::RecipeScaler;
pub use run_lifecycle::RunLifecycleManager;

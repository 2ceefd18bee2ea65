// ==========================================
// 配料批次执行系统 - API 层
// ==========================================
// 职责: 对外命令面与查询面, 返回可区分的成功/失败结果
// ==========================================

pub mod adjustment_api;
pub mod auto_weigh_api;
pub mod batch_api;
pub mod error;
pub mod production_event_api;
pub mod recipe_api;
pub mod run_api;

// 重导出核心类型
pub use adjustment_api::AdjustmentApi;
pub use auto_weigh_api::AutoWeighApi;
pub use batch_api::{BatchApi, BatchSummary, IngredientShortfall};
pub use error::{ApiError, ApiResult};
pub use production_event_api::ProductionEventApi;
pub use recipe_api::{RecipeApi, RecipeImportResponse};
pub use run_api::{RunApi, RunProgress};

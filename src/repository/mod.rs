// ==========================================
// 配料批次执行系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod adjustment_repo;
pub mod batch_repo;
pub mod error;
pub mod production_event_repo;
pub mod recipe_repo;
pub mod run_repo;
pub mod source_material_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use adjustment_repo::AdjustmentRepository;
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use production_event_repo::ProductionEventRepository;
pub use recipe_repo::RecipeRepository;
pub use run_repo::RunRepository;
pub use source_material_repo::SourceMaterialRepository;

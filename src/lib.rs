// ==========================================
// 配料批次执行系统 - 核心库
// ==========================================
// 生产任务 → 批次 → 投料台账 / 质量门 / 纠偏工单
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AdjustmentStatus, BatchStatus, ConsumptionKind, NirsStatus, ProductionEventType, RunStatus,
    SamplingStatus,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, AdjustmentMaterial, AdjustmentOrder, Batch, ConsumptionEntry,
    ConsumptionLedger, ProductionEvent, Recipe, RecipeIngredient, Run, ScaledRequirement,
    SourceMaterial,
};

// 引擎
pub use engine::{
    AdjustmentWorkflow, AutoWeighLoop, BatchController, CloseBlocker, CloseReport, QualityGate,
    RecipeScaler, RunLifecycleManager,
};

// API
pub use api::{AdjustmentApi, ApiError, ApiResult, AutoWeighApi, BatchApi, RunApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "配料批次执行系统";

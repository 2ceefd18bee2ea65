// ==========================================
// 配料批次执行系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 所有仓储共享同一个数据库连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{
    AdjustmentApi, AutoWeighApi, BatchApi, ProductionEventApi, RecipeApi, RunApi,
};
use crate::config::{ConfigManager, ExecutionConfig};
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{
    AdjustmentWorkflow, BatchController, KeyedLocks, ProcessingMarkers, RecipeLookup,
    SimulatedScale, SourceMaterialLookup,
};
use crate::repository::{
    ActionLogRepository, AdjustmentRepository, BatchRepository, ProductionEventRepository,
    RecipeRepository, RunRepository, SourceMaterialRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的执行配置
    pub execution_config: ExecutionConfig,

    pub config_manager: Arc<ConfigManager>,

    /// 配方API
    pub recipe_api: Arc<RecipeApi>,

    /// 生产任务API
    pub run_api: Arc<RunApi>,

    /// 批次API
    pub batch_api: Arc<BatchApi>,

    /// 纠偏工单API
    pub adjustment_api: Arc<AdjustmentApi>,

    /// 自动称重API
    pub auto_weigh_api: Arc<AutoWeighApi>,

    /// 生产事件API
    pub production_event_api: Arc<ProductionEventApi>,

    /// 来源物料仓储 (库存协作方的本地快照)
    pub source_material_repo: Arc<SourceMaterialRepository>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 1. 打开数据库并初始化表结构
    /// 2. 从 config_kv 加载执行配置
    /// 3. 初始化所有Repository与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库表结构初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let execution_config = config_manager
            .load_execution_config()
            .map_err(|e| format!("执行配置加载失败: {}", e))?;
        tracing::info!(?execution_config, "执行配置已加载");

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let recipe_repo = Arc::new(RecipeRepository::new(conn.clone()));
        let source_material_repo = Arc::new(SourceMaterialRepository::new(conn.clone()));
        let run_repo = Arc::new(RunRepository::new(conn.clone()));
        let batch_repo = Arc::new(BatchRepository::new(conn.clone()));
        let adjustment_repo = Arc::new(AdjustmentRepository::new(conn.clone()));
        let event_repo = Arc::new(ProductionEventRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn));

        let recipes: Arc<dyn RecipeLookup> = recipe_repo.clone();
        let sources: Arc<dyn SourceMaterialLookup> = source_material_repo.clone();

        // 批次锁与处理中标记在批次/纠偏/自动称重之间共享
        let batch_locks = KeyedLocks::new();
        let markers = ProcessingMarkers::new();

        // ==========================================
        // 初始化API层
        // ==========================================
        let recipe_api = Arc::new(RecipeApi::new(recipe_repo, action_log_repo.clone()));
        let run_api = Arc::new(RunApi::new(
            run_repo.clone(),
            action_log_repo.clone(),
            recipes.clone(),
        ));
        let batch_api = Arc::new(BatchApi::new(
            batch_repo.clone(),
            adjustment_repo.clone(),
            action_log_repo.clone(),
            recipes,
            sources.clone(),
            batch_locks.clone(),
            markers.clone(),
            BatchController::new(execution_config.consumption_tolerance_ratio),
        ));
        let adjustment_api = Arc::new(AdjustmentApi::new(
            adjustment_repo,
            batch_repo,
            action_log_repo.clone(),
            sources,
            batch_locks,
            markers,
            AdjustmentWorkflow::new(execution_config.pick_tolerance_ratio),
        ));
        let scale = Arc::new(SimulatedScale::new(
            execution_config.auto_weigh_latency(),
            &execution_config.auto_weigh_source_reference,
        ));
        let auto_weigh_api = Arc::new(AutoWeighApi::new(batch_api.clone(), scale));
        let production_event_api = Arc::new(ProductionEventApi::new(
            event_repo,
            run_repo,
            action_log_repo.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            execution_config,
            config_manager,
            recipe_api,
            run_api,
            batch_api,
            adjustment_api,
            auto_weigh_api,
            production_event_api,
            source_material_repo,
            action_log_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先读取环境变量 BATCH_EXECUTION_DB_PATH, 否则使用用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("BATCH_EXECUTION_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./batch_execution.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("batch-execution-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("batch-execution");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("batch_execution.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_state_initializes_schema_and_config() {
        let file = NamedTempFile::new().unwrap();
        let db_path = file.path().to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);
        assert_eq!(state.execution_config, ExecutionConfig::default());
        assert!(state.recipe_api.list_recipes().unwrap().is_empty());

        // 二次打开同一数据库 (建表幂等)
        drop(state);
        assert!(AppState::new(db_path).is_ok());
    }
}

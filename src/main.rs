// ==========================================
// 配料批次执行系统 - 主入口
// ==========================================
// 初始化日志 → 打开默认数据库 → 报告表结构版本与执行配置
// ==========================================

use batch_execution::app::{get_default_db_path, AppState};
use batch_execution::db::{open_sqlite_connection, read_schema_version};
use batch_execution::logging;

fn main() {
    // LOG_FORMAT=json 时输出 JSON 行
    match std::env::var("LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => logging::init_json(),
        _ => logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{}", batch_execution::APP_NAME);
    tracing::info!("系统版本: {}", batch_execution::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = match AppState::new(db_path.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("AppState初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    match open_sqlite_connection(&db_path).and_then(|conn| read_schema_version(&conn)) {
        Ok(Some(version)) => tracing::info!("数据库表结构版本: {}", version),
        Ok(None) => tracing::warn!("数据库缺少 schema_version"),
        Err(e) => tracing::warn!("读取表结构版本失败: {}", e),
    }

    let config = &state.execution_config;
    tracing::info!(
        consumption_tolerance_ratio = config.consumption_tolerance_ratio,
        pick_tolerance_ratio = config.pick_tolerance_ratio,
        auto_weigh_latency_ms = config.auto_weigh_latency_ms,
        auto_weigh_source_reference = %config.auto_weigh_source_reference,
        "执行配置"
    );

    match state.recipe_api.list_recipes() {
        Ok(recipes) => tracing::info!("已登记配方: {} 个", recipes.len()),
        Err(e) => tracing::warn!("配方查询失败: {}", e),
    }
}

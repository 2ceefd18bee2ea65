// ==========================================
// 配料批次执行系统 - 配方 API
// ==========================================
// 职责: 配方 CSV 导入、配方查询、按目标重量缩放
// 配方只读: 重复导入同一配方ID被唯一约束拒绝
// ==========================================

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::batch_api::require_non_empty;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::recipe::{Recipe, ScaledRequirement};
use crate::engine::recipe_scaler::RecipeScaler;
use crate::importer::recipe_csv::RecipeCsvParser;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::recipe_repo::RecipeRepository;

/// 导入结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeImportResponse {
    pub imported: usize,
    pub recipe_ids: Vec<String>,
    pub elapsed_ms: u64,
}

pub struct RecipeApi {
    recipe_repo: Arc<RecipeRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    scaler: RecipeScaler,
}

impl RecipeApi {
    pub fn new(recipe_repo: Arc<RecipeRepository>, action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self {
            recipe_repo,
            action_log_repo,
            scaler: RecipeScaler::new(),
        }
    }

    /// 从 CSV 文件导入配方 (全部成功或全部回滚)
    pub fn import_csv(&self, file_path: &str, operator: &str) -> ApiResult<RecipeImportResponse> {
        require_non_empty(file_path, "文件路径")?;
        require_non_empty(operator, "操作人")?;

        let start = std::time::Instant::now();
        let recipes = RecipeCsvParser::parse_file(Path::new(file_path)).map_err(|e| {
            warn!(file = %file_path, error = %e, "配方文件解析失败");
            ApiError::ImportError(e.to_string())
        })?;
        let imported = self.recipe_repo.insert_all(&recipes)?;
        let recipe_ids: Vec<String> = recipes.iter().map(|r| r.recipe_id.clone()).collect();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!(file = %file_path, imported, elapsed_ms, "配方导入完成");
        let log = ActionLog::new(ActionType::ImportRecipe, operator)
            .with_payload(&serde_json::json!({
                "file_path": file_path,
                "recipe_ids": &recipe_ids,
            }))
            .with_detail(format!("导入配方 {} 个", imported));
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!("记录操作日志失败: {}", e);
        }

        Ok(RecipeImportResponse {
            imported,
            recipe_ids,
            elapsed_ms,
        })
    }

    pub fn get_recipe(&self, recipe_id: &str) -> ApiResult<Recipe> {
        require_non_empty(recipe_id, "配方ID")?;
        self.recipe_repo
            .find_by_id(recipe_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Recipe(id={})不存在", recipe_id)))
    }

    pub fn list_recipes(&self) -> ApiResult<Vec<Recipe>> {
        Ok(self.recipe_repo.list_all()?)
    }

    /// 按目标批次重量缩放配方 (配方合计为 0 时返回空列表)
    pub fn scaled_requirements(
        &self,
        recipe_id: &str,
        target_batch_weight: f64,
    ) -> ApiResult<Vec<ScaledRequirement>> {
        if !target_batch_weight.is_finite() || target_batch_weight <= 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "目标批次重量无效: {}",
                target_batch_weight
            )));
        }
        let recipe = self.get_recipe(recipe_id)?;
        Ok(self.scaler.scale(&recipe, target_batch_weight))
    }
}

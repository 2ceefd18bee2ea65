// ==========================================
// 配料批次执行系统 - 生产任务 API
// ==========================================
// 职责: 任务初始化/启动批次/暂停恢复/关闭任务, 任务进度查询
// 并发: 按 run_id 串行化生命周期命令
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::batch_api::require_non_empty;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::batch::Batch;
use crate::domain::run::Run;
use crate::domain::types::RunStatus;
use crate::engine::collaborators::RecipeLookup;
use crate::engine::processing::KeyedLocks;
use crate::engine::run_lifecycle::RunLifecycleManager;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::run_repo::RunRepository;

/// 任务进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: String,
    pub status: RunStatus,
    pub batch_count: usize,
    pub completed_batch_count: usize,
    pub ongoing_batch_number: Option<u32>,
    pub target_total_weight: f64,
    pub total_consumed_weight: f64,
}

// ==========================================
// RunApi - 生产任务 API
// ==========================================
pub struct RunApi {
    run_repo: Arc<RunRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    recipes: Arc<dyn RecipeLookup>,
    locks: KeyedLocks,
    lifecycle: RunLifecycleManager,
}

impl RunApi {
    pub fn new(
        run_repo: Arc<RunRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        recipes: Arc<dyn RecipeLookup>,
    ) -> Self {
        Self {
            run_repo,
            action_log_repo,
            recipes,
            locks: KeyedLocks::new(),
            lifecycle: RunLifecycleManager::new(),
        }
    }

    // ==========================================
    // 生命周期命令
    // ==========================================

    /// 初始化生产任务
    ///
    /// # 参数
    /// - target_total_weight: 任务总目标重量 (kg)
    /// - batch_size: 选定的批次重量 (kg), 最后一批为余量
    pub fn initialize_run(
        &self,
        recipe_id: &str,
        target_total_weight: f64,
        batch_size: f64,
        operator: &str,
    ) -> ApiResult<Run> {
        require_non_empty(recipe_id, "配方ID")?;
        require_non_empty(operator, "操作人")?;

        let recipe = self
            .recipes
            .find_recipe(recipe_id.trim())
            .map_err(|e| ApiError::External(format!("配方查询失败: {}", e)))?
            .ok_or_else(|| ApiError::NotFound(format!("Recipe(id={})不存在", recipe_id)))?;

        let run = self
            .lifecycle
            .initialize(&recipe.recipe_id, target_total_weight, batch_size, operator)?;
        self.run_repo.insert(&run)?;

        info!(
            run_id = %run.run_id,
            recipe_id = %run.recipe_id,
            batches = run.batches.len(),
            target_total_weight,
            batch_size,
            "生产任务已初始化"
        );
        self.audit(
            ActionLog::new(ActionType::InitializeRun, operator)
                .with_run(&run.run_id)
                .with_payload(&serde_json::json!({
                    "recipe_id": run.recipe_id,
                    "target_total_weight": target_total_weight,
                    "batch_size": batch_size,
                    "batch_weights": run.batches.iter().map(|b| b.target_weight).collect::<Vec<_>>(),
                })),
        );
        Ok(run)
    }

    /// 启动下一个计划批次
    ///
    /// # 返回
    /// 被启动的批次
    pub fn start_next_batch(&self, run_id: &str, operator: &str) -> ApiResult<Batch> {
        require_non_empty(operator, "操作人")?;
        let lock = self.locks.lock_for(run_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut run = self.load_run(run_id)?;
        let index = self
            .lifecycle
            .start_next_batch(&mut run)
            .inspect_err(|e| warn!(run_id = %run_id, error = %e, "启动批次被拒绝"))?;
        let batch = run.batches[index].clone();
        self.run_repo.save_lifecycle(&run, Some(&batch))?;

        info!(
            run_id = %run_id,
            batch_id = %batch.batch_id,
            batch_number = batch.batch_number,
            "批次已启动"
        );
        self.audit(
            ActionLog::new(ActionType::StartBatch, operator)
                .with_run(run_id)
                .with_batch(&batch.batch_id)
                .with_payload(&serde_json::json!({
                    "batch_number": batch.batch_number,
                    "target_weight": batch.target_weight,
                })),
        );
        Ok(batch)
    }

    pub fn pause(&self, run_id: &str, operator: &str) -> ApiResult<Run> {
        self.toggle(run_id, operator, ActionType::PauseRun, |m, run| m.pause(run))
    }

    pub fn resume(&self, run_id: &str, operator: &str) -> ApiResult<Run> {
        self.toggle(run_id, operator, ActionType::ResumeRun, |m, run| m.resume(run))
    }

    /// 请求关闭任务
    ///
    /// # 返回
    /// - Err(RunCloseRejected): 列出未完成的批次号
    pub fn request_close_run(&self, run_id: &str, operator: &str) -> ApiResult<Run> {
        self.toggle(run_id, operator, ActionType::CloseRun, |m, run| {
            m.request_close_run(run)
        })
    }

    // ==========================================
    // 查询接口
    // ==========================================

    pub fn get_run(&self, run_id: &str) -> ApiResult<Run> {
        require_non_empty(run_id, "任务ID")?;
        self.load_run(run_id)
    }

    pub fn list_runs(&self) -> ApiResult<Vec<Run>> {
        Ok(self.run_repo.list_all()?)
    }

    pub fn run_progress(&self, run_id: &str) -> ApiResult<RunProgress> {
        let run = self.get_run(run_id)?;
        Ok(RunProgress {
            batch_count: run.batches.len(),
            completed_batch_count: run.completed_batch_count(),
            ongoing_batch_number: run.ongoing_batch().map(|b| b.batch_number),
            total_consumed_weight: run.total_consumed_weight(),
            target_total_weight: run.target_total_weight,
            status: run.status,
            run_id: run.run_id,
        })
    }

    /// 任务操作历史 (含批次命令)
    pub fn action_history(&self, run_id: &str) -> ApiResult<Vec<ActionLog>> {
        require_non_empty(run_id, "任务ID")?;
        Ok(self.action_log_repo.find_by_run(run_id)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 只改任务状态的生命周期命令
    fn toggle<F>(&self, run_id: &str, operator: &str, action: ActionType, apply: F) -> ApiResult<Run>
    where
        F: FnOnce(&RunLifecycleManager, &mut Run) -> crate::engine::ExecutionResult<()>,
    {
        require_non_empty(operator, "操作人")?;
        let lock = self.locks.lock_for(run_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut run = self.load_run(run_id)?;
        let from = run.status;
        apply(&self.lifecycle, &mut run).inspect_err(|e| {
            warn!(run_id = %run_id, action = action.as_str(), error = %e, "任务操作被拒绝");
        })?;
        self.run_repo.save_lifecycle(&run, None)?;

        info!(run_id = %run_id, from = %from, to = %run.status, action = action.as_str(), "任务状态已更新");
        self.audit(
            ActionLog::new(action, operator)
                .with_run(run_id)
                .with_payload(&serde_json::json!({ "from": from, "to": run.status })),
        );
        Ok(run)
    }

    fn load_run(&self, run_id: &str) -> ApiResult<Run> {
        require_non_empty(run_id, "任务ID")?;
        self.run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Run(id={})不存在", run_id)))
    }

    fn audit(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!("记录操作日志失败: {}", e);
        }
    }
}

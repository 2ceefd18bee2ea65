// ==========================================
// 配料批次执行系统 - 生产任务生命周期引擎
// ==========================================
// 状态机: planned → ongoing ⇄ paused → completed
// 职责: 批次拆分、批次启动排序、任务关闭判定
// 红线: 同一任务内至多一个批次 ongoing
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::run::Run;
use crate::domain::types::{BatchStatus, RunStatus};
use crate::engine::batch_controller::QUANTITY_EPSILON;
use crate::engine::error::{ExecutionError, ExecutionResult};

// ==========================================
// RunLifecycleManager - 生产任务生命周期
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLifecycleManager;

impl RunLifecycleManager {
    pub fn new() -> Self {
        Self
    }

    /// 初始化生产任务
    ///
    /// 批次数 = ceil(总目标 / 批次重量), 最后一批为余量
    pub fn initialize(
        &self,
        recipe_id: &str,
        target_total_weight: f64,
        batch_size: f64,
        operator: &str,
    ) -> ExecutionResult<Run> {
        if recipe_id.trim().is_empty() {
            return Err(ExecutionError::Validation("配方ID不能为空".to_string()));
        }
        if !target_total_weight.is_finite() || target_total_weight <= 0.0 {
            return Err(ExecutionError::Validation(format!(
                "任务目标重量无效: {}",
                target_total_weight
            )));
        }
        if !batch_size.is_finite() || batch_size <= 0.0 {
            return Err(ExecutionError::Validation(format!(
                "批次重量无效: {}",
                batch_size
            )));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let weights = Self::split_batches(target_total_weight, batch_size);
        let batches = weights
            .iter()
            .enumerate()
            .map(|(i, w)| Batch::new(&run_id, (i + 1) as u32, *w))
            .collect();

        tracing::debug!(
            run_id = %run_id,
            batch_count = weights.len(),
            "生产任务批次拆分完成"
        );

        Ok(Run {
            run_id,
            recipe_id: recipe_id.trim().to_string(),
            target_total_weight,
            batch_size,
            status: RunStatus::Planned,
            batches,
            events: Vec::new(),
            created_by: operator.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            completed_at: None,
        })
    }

    /// 拆分批次重量
    pub fn split_batches(target_total_weight: f64, batch_size: f64) -> Vec<f64> {
        let count = ((target_total_weight / batch_size) - QUANTITY_EPSILON).ceil().max(1.0) as usize;
        let mut weights = vec![batch_size; count];
        let remainder = target_total_weight - batch_size * (count - 1) as f64;
        if let Some(last) = weights.last_mut() {
            *last = remainder;
        }
        weights
    }

    /// 启动下一个批次
    ///
    /// # 返回
    /// 被启动批次的下标
    pub fn start_next_batch(&self, run: &mut Run) -> ExecutionResult<usize> {
        match run.status {
            RunStatus::Completed => {
                return Err(ExecutionError::transition(
                    "Run",
                    run.status,
                    RunStatus::Ongoing,
                ))
            }
            RunStatus::Paused => {
                return Err(ExecutionError::BusinessRuleViolation(
                    "任务已暂停, 请先恢复后再启动批次".to_string(),
                ))
            }
            RunStatus::Planned | RunStatus::Ongoing => {}
        }

        if let Some(ongoing) = run.ongoing_batch() {
            return Err(ExecutionError::BusinessRuleViolation(format!(
                "批次 {} 仍在投料中, 不可启动下一批次",
                ongoing.batch_number
            )));
        }

        let index = run
            .batches
            .iter()
            .position(|b| b.status == BatchStatus::Planned)
            .ok_or_else(|| {
                ExecutionError::BusinessRuleViolation("没有待投料的批次".to_string())
            })?;

        let batch = &mut run.batches[index];
        batch.status = BatchStatus::Ongoing;
        batch.started_at = Some(chrono::Utc::now().naive_utc());
        run.status = RunStatus::Ongoing;
        Ok(index)
    }

    /// 暂停 (不影响批次状态)
    pub fn pause(&self, run: &mut Run) -> ExecutionResult<()> {
        if run.status != RunStatus::Ongoing {
            return Err(ExecutionError::transition("Run", run.status, RunStatus::Paused));
        }
        run.status = RunStatus::Paused;
        Ok(())
    }

    /// 恢复
    pub fn resume(&self, run: &mut Run) -> ExecutionResult<()> {
        if run.status != RunStatus::Paused {
            return Err(ExecutionError::transition("Run", run.status, RunStatus::Ongoing));
        }
        run.status = RunStatus::Ongoing;
        Ok(())
    }

    /// 请求关闭任务 (全部批次已关闭)
    pub fn request_close_run(&self, run: &mut Run) -> ExecutionResult<()> {
        if run.status == RunStatus::Completed {
            return Err(ExecutionError::transition(
                "Run",
                run.status,
                RunStatus::Completed,
            ));
        }

        let open_batches: Vec<u32> = run
            .batches
            .iter()
            .filter(|b| b.status != BatchStatus::Completed)
            .map(|b| b.batch_number)
            .collect();
        if !open_batches.is_empty() {
            return Err(ExecutionError::RunCloseRejected { open_batches });
        }

        run.status = RunStatus::Completed;
        run.completed_at = Some(chrono::Utc::now().naive_utc());
        Ok(())
    }
}

// ==========================================
// 配料批次执行系统 - 生产事件 API
// ==========================================
// 生产备注: 只追加, 仅允许显式删除, 与状态机无耦合
// ==========================================

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::batch_api::require_non_empty;
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::production_event::ProductionEvent;
use crate::domain::types::ProductionEventType;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::production_event_repo::ProductionEventRepository;
use crate::repository::run_repo::RunRepository;

pub struct ProductionEventApi {
    event_repo: Arc<ProductionEventRepository>,
    run_repo: Arc<RunRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ProductionEventApi {
    pub fn new(
        event_repo: Arc<ProductionEventRepository>,
        run_repo: Arc<RunRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            event_repo,
            run_repo,
            action_log_repo,
        }
    }

    /// 添加生产事件
    pub fn add_event(
        &self,
        run_id: &str,
        event_type: ProductionEventType,
        description: &str,
        author: &str,
    ) -> ApiResult<ProductionEvent> {
        require_non_empty(run_id, "任务ID")?;
        require_non_empty(description, "事件描述")?;
        require_non_empty(author, "记录人")?;

        if self.run_repo.find_by_id(run_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Run(id={})不存在", run_id)));
        }

        let event = ProductionEvent::new(run_id, event_type, description.trim(), author);
        self.event_repo.insert(&event)?;

        info!(run_id = %run_id, event_id = %event.event_id, event_type = %event_type, "生产事件已添加");
        self.audit(
            ActionLog::new(ActionType::AddProductionEvent, author)
                .with_run(run_id)
                .with_payload(&event),
        );
        Ok(event)
    }

    /// 任务的生产事件 (按时间正序)
    pub fn list_events(&self, run_id: &str) -> ApiResult<Vec<ProductionEvent>> {
        require_non_empty(run_id, "任务ID")?;
        Ok(self.event_repo.find_by_run(run_id)?)
    }

    /// 删除生产事件
    pub fn delete_event(&self, event_id: &str, operator: &str) -> ApiResult<()> {
        require_non_empty(event_id, "事件ID")?;
        require_non_empty(operator, "操作人")?;

        let event = self
            .event_repo
            .find_by_id(event_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ProductionEvent(id={})不存在", event_id)))?;
        self.event_repo.delete(event_id)?;

        info!(run_id = %event.run_id, event_id = %event_id, "生产事件已删除");
        self.audit(
            ActionLog::new(ActionType::DeleteProductionEvent, operator)
                .with_run(&event.run_id)
                .with_payload(&event),
        );
        Ok(())
    }

    fn audit(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!("记录操作日志失败: {}", e);
        }
    }
}

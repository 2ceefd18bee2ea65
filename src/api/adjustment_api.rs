// ==========================================
// 配料批次执行系统 - 纠偏工单 API
// ==========================================
// 职责: 纠偏工单创建/备料/合并投料/取消
// 并发: 与 BatchApi 共用批次锁, 所有写命令在锁内重新加载工单与批次
// 红线: 合并投料时工单完成与台账追加同一事务提交
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::api::batch_api::{check_source_availability, require_non_empty};
use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::adjustment::{AdjustmentMaterial, AdjustmentOrder};
use crate::domain::batch::Batch;
use crate::domain::consumption::ConsumptionEntry;
use crate::engine::adjustment_workflow::AdjustmentWorkflow;
use crate::engine::batch_controller::QUANTITY_EPSILON;
use crate::engine::collaborators::SourceMaterialLookup;
use crate::engine::processing::{KeyedLocks, ProcessingMarkers};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::adjustment_repo::AdjustmentRepository;
use crate::repository::batch_repo::BatchRepository;

// ==========================================
// AdjustmentApi - 纠偏工单 API
// ==========================================
pub struct AdjustmentApi {
    adjustment_repo: Arc<AdjustmentRepository>,
    batch_repo: Arc<BatchRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    sources: Arc<dyn SourceMaterialLookup>,
    locks: KeyedLocks,
    markers: ProcessingMarkers,
    workflow: AdjustmentWorkflow,
}

impl AdjustmentApi {
    pub fn new(
        adjustment_repo: Arc<AdjustmentRepository>,
        batch_repo: Arc<BatchRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        sources: Arc<dyn SourceMaterialLookup>,
        locks: KeyedLocks,
        markers: ProcessingMarkers,
        workflow: AdjustmentWorkflow,
    ) -> Self {
        Self {
            adjustment_repo,
            batch_repo,
            action_log_repo,
            sources,
            locks,
            markers,
            workflow,
        }
    }

    // ==========================================
    // 写入命令
    // ==========================================

    /// 创建纠偏工单
    ///
    /// # 参数
    /// - materials: 纠偏物料 (由配方纠偏建议方提供)
    ///
    /// 物料的来源批号按需求量校验 (存在、未冻结、剩余可用量充足)
    pub fn create(
        &self,
        batch_id: &str,
        materials: Vec<AdjustmentMaterial>,
        operator: &str,
    ) -> ApiResult<AdjustmentOrder> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(operator, "操作人")?;

        let lock = self.locks.lock_for(batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let batch = self.load_batch(batch_id)?;
        let existing = self.adjustment_repo.find_by_batch(batch_id)?;
        let order = self
            .workflow
            .create(&batch, &existing, materials, operator)
            .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "纠偏工单创建被拒绝"))?;
        self.check_sources(&order, |m| m.required_quantity)
            .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "纠偏物料来源校验失败"))?;
        self.adjustment_repo.insert(&order)?;

        info!(
            batch_id = %batch_id,
            adjustment_id = %order.adjustment_id,
            materials = order.materials.len(),
            nirs_sequence = order.nirs_sequence,
            "纠偏工单已创建"
        );
        self.audit(&batch, &order, ActionType::CreateAdjustment, operator, None);
        Ok(order)
    }

    /// 指定暂存位 (planned → material_picking)
    pub fn assign_staging(
        &self,
        adjustment_id: &str,
        location: &str,
        operator: &str,
    ) -> ApiResult<AdjustmentOrder> {
        require_non_empty(location, "暂存位")?;
        self.mutate(adjustment_id, operator, ActionType::AssignStaging, |wf, order| {
            wf.assign_staging(order, location)
        })
    }

    /// 备料 (已拣量累加, 不得超过需求量)
    pub fn pick(
        &self,
        adjustment_id: &str,
        material_index: usize,
        picked_quantity: f64,
        operator: &str,
    ) -> ApiResult<AdjustmentOrder> {
        self.mutate(adjustment_id, operator, ActionType::PickAdjustment, |wf, order| {
            wf.pick(order, material_index, picked_quantity)
        })
    }

    /// 取消工单 (已合并的投料不回滚, 合并前不存在投料)
    pub fn cancel(&self, adjustment_id: &str, operator: &str) -> ApiResult<AdjustmentOrder> {
        self.mutate(adjustment_id, operator, ActionType::CancelAdjustment, |wf, order| {
            wf.cancel(order)
        })
    }

    /// 合并投料 (processing → completed)
    ///
    /// 工单物料涉及的配料在合并期间持有处理中标记;
    /// 入账前按已拣量重新校验来源批号
    pub fn consume(&self, adjustment_id: &str, operator: &str) -> ApiResult<Vec<ConsumptionEntry>> {
        require_non_empty(adjustment_id, "工单ID")?;
        require_non_empty(operator, "操作人")?;

        let batch_id = self.load_order(adjustment_id)?.batch_id;
        let lock = self.locks.lock_for(&batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut order = self.load_order(adjustment_id)?;
        let mut batch = self.load_batch(&batch_id)?;

        let mut ingredients: Vec<&str> = order
            .materials
            .iter()
            .map(|m| m.ingredient_name.as_str())
            .collect();
        ingredients.sort_unstable();
        ingredients.dedup();
        let _markers = ingredients
            .into_iter()
            .map(|name| self.markers.try_acquire(&batch_id, name))
            .collect::<Result<Vec<_>, _>>()?;

        let entries = self
            .workflow
            .consume(&mut order, &mut batch, operator)
            .inspect_err(|e| warn!(adjustment_id = %adjustment_id, error = %e, "合并投料被拒绝"))?;
        self.check_sources(&order, |m| m.picked_quantity)
            .inspect_err(|e| warn!(adjustment_id = %adjustment_id, error = %e, "纠偏物料来源校验失败"))?;
        self.adjustment_repo.complete_with_batch(&order, &batch)?;

        info!(
            batch_id = %batch_id,
            adjustment_id = %adjustment_id,
            entries = entries.len(),
            "纠偏物料已合并投料"
        );
        self.audit(
            &batch,
            &order,
            ActionType::ConsumeAdjustment,
            operator,
            Some(serde_json::json!({ "entries": &entries })),
        );
        Ok(entries)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    pub fn get(&self, adjustment_id: &str) -> ApiResult<AdjustmentOrder> {
        require_non_empty(adjustment_id, "工单ID")?;
        self.load_order(adjustment_id)
    }

    pub fn list_by_batch(&self, batch_id: &str) -> ApiResult<Vec<AdjustmentOrder>> {
        require_non_empty(batch_id, "批次ID")?;
        Ok(self.adjustment_repo.find_by_batch(batch_id)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 锁内重新加载工单, 执行状态变更并保存
    fn mutate<F>(
        &self,
        adjustment_id: &str,
        operator: &str,
        action: ActionType,
        apply: F,
    ) -> ApiResult<AdjustmentOrder>
    where
        F: FnOnce(&AdjustmentWorkflow, &mut AdjustmentOrder) -> crate::engine::ExecutionResult<()>,
    {
        require_non_empty(adjustment_id, "工单ID")?;
        require_non_empty(operator, "操作人")?;

        let batch_id = self.load_order(adjustment_id)?.batch_id;
        let lock = self.locks.lock_for(&batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut order = self.load_order(adjustment_id)?;
        apply(&self.workflow, &mut order).inspect_err(|e| {
            warn!(adjustment_id = %adjustment_id, action = action.as_str(), error = %e, "纠偏工单操作被拒绝");
        })?;
        self.adjustment_repo.update(&order)?;

        info!(
            batch_id = %batch_id,
            adjustment_id = %adjustment_id,
            status = %order.status,
            action = action.as_str(),
            "纠偏工单已更新"
        );
        let batch = self.load_batch(&batch_id)?;
        self.audit(&batch, &order, action, operator, None);
        Ok(order)
    }

    /// 按来源批号汇总数量后逐个校验 (数量为零的物料不入账, 跳过)
    fn check_sources<F>(&self, order: &AdjustmentOrder, quantity_of: F) -> ApiResult<()>
    where
        F: Fn(&AdjustmentMaterial) -> f64,
    {
        let mut per_source: BTreeMap<&str, f64> = BTreeMap::new();
        for material in &order.materials {
            let quantity = quantity_of(material);
            if quantity > QUANTITY_EPSILON {
                *per_source.entry(material.source_reference.trim()).or_default() += quantity;
            }
        }
        for (source_reference, quantity) in per_source {
            check_source_availability(
                self.sources.as_ref(),
                &self.batch_repo,
                source_reference,
                quantity,
            )?;
        }
        Ok(())
    }

    fn load_order(&self, adjustment_id: &str) -> ApiResult<AdjustmentOrder> {
        self.adjustment_repo
            .find_by_id(adjustment_id)?
            .ok_or_else(|| ApiError::NotFound(format!("AdjustmentOrder(id={})不存在", adjustment_id)))
    }

    fn load_batch(&self, batch_id: &str) -> ApiResult<Batch> {
        self.batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Batch(id={})不存在", batch_id)))
    }

    fn audit(
        &self,
        batch: &Batch,
        order: &AdjustmentOrder,
        action: ActionType,
        operator: &str,
        extra: Option<serde_json::Value>,
    ) {
        let mut log = ActionLog::new(action, operator)
            .with_run(&batch.run_id)
            .with_batch(&batch.batch_id)
            .with_payload(&serde_json::json!({
                "adjustment_id": order.adjustment_id,
                "status": order.status,
                "materials": order.materials,
                "staging_location": order.staging_location,
            }));
        if let Some(extra) = extra {
            log = log.with_detail(extra.to_string());
        }
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!("记录操作日志失败: {}", e);
        }
    }
}

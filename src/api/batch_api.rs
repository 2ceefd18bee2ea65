// ==========================================
// 配料批次执行系统 - 批次 API
// ==========================================
// 职责: 投料/作废/签核/质量确认/关闭批次, 以及批次查询面
// 并发: 按 batch_id 串行化写命令; 投料前必须持有配料处理中标记
// 锁顺序: 处理中标记 (非阻塞) → 批次锁 → 数据库连接
// ==========================================

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::adjustment::AdjustmentOrder;
use crate::domain::batch::Batch;
use crate::domain::consumption::ConsumptionEntry;
use crate::domain::recipe::ScaledRequirement;
use crate::domain::types::{BatchStatus, ConsumptionKind, NirsStatus, SamplingStatus};
use crate::engine::auto_weigh::WeighingStation;
use crate::engine::batch_controller::{
    BatchController, ConsumptionCommand, IngredientProgress, QUANTITY_EPSILON,
};
use crate::engine::collaborators::{RecipeLookup, SourceMaterialLookup};
use crate::engine::error::CloseReport;
use crate::engine::processing::{KeyedLocks, ProcessingGuard, ProcessingMarkers};
use crate::engine::quality_gate::QualityGate;
use crate::engine::recipe_scaler::RecipeScaler;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::adjustment_repo::AdjustmentRepository;
use crate::repository::batch_repo::BatchRepository;

// ==========================================
// 查询结果
// ==========================================

/// 配料未满足量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientShortfall {
    pub ingredient_name: String,
    pub shortfall: f64,
}

/// 批次概览 (前端展示用)
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub run_id: String,
    pub batch_number: u32,
    pub status: BatchStatus,
    pub target_weight: f64,
    pub nirs: NirsStatus,
    pub sampling: SamplingStatus,
    pub ingredients: Vec<IngredientProgress>,
    pub adjustments: Vec<AdjustmentOrder>,
    pub close_report: CloseReport,
}

// ==========================================
// BatchApi - 批次 API
// ==========================================

/// 批次API
///
/// 职责：
/// 1. 投料台账写入 (人工/自动)
/// 2. 人工签核与作废
/// 3. 质量确认 (NIRS / 取样)
/// 4. 关闭批次 (结构化拒绝原因)
/// 5. ActionLog记录
pub struct BatchApi {
    batch_repo: Arc<BatchRepository>,
    adjustment_repo: Arc<AdjustmentRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    recipes: Arc<dyn RecipeLookup>,
    sources: Arc<dyn SourceMaterialLookup>,
    locks: KeyedLocks,
    markers: ProcessingMarkers,
    controller: BatchController,
    scaler: RecipeScaler,
    gate: QualityGate,
}

impl BatchApi {
    /// 创建新的BatchApi实例
    ///
    /// # 参数
    /// - locks: 批次锁表, 与 AdjustmentApi 共用
    /// - markers: 处理中标记, 与自动称重共用
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batch_repo: Arc<BatchRepository>,
        adjustment_repo: Arc<AdjustmentRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        recipes: Arc<dyn RecipeLookup>,
        sources: Arc<dyn SourceMaterialLookup>,
        locks: KeyedLocks,
        markers: ProcessingMarkers,
        controller: BatchController,
    ) -> Self {
        Self {
            batch_repo,
            adjustment_repo,
            action_log_repo,
            recipes,
            sources,
            locks,
            markers,
            controller,
            scaler: RecipeScaler::new(),
            gate: QualityGate::new(),
        }
    }

    // ==========================================
    // 投料
    // ==========================================

    /// 人工记录投料
    ///
    /// # 参数
    /// - quantity: 带符号数量, 负数为对多录的冲正
    ///
    /// # 返回
    /// - Err(IngredientBusy): 该配料正在自动称重
    pub fn record_consumption(
        &self,
        batch_id: &str,
        ingredient_name: &str,
        source_reference: &str,
        quantity: f64,
        operator: &str,
    ) -> ApiResult<ConsumptionEntry> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(ingredient_name, "配料名称")?;
        require_non_empty(operator, "操作人")?;

        let guard = self.markers.try_acquire(batch_id, ingredient_name)?;
        self.record_consumption_held(&guard, source_reference, quantity, ConsumptionKind::Manual, operator)
    }

    /// 持有处理中标记时写入台账
    fn record_consumption_held(
        &self,
        guard: &ProcessingGuard,
        source_reference: &str,
        quantity: f64,
        kind: ConsumptionKind,
        operator: &str,
    ) -> ApiResult<ConsumptionEntry> {
        require_non_empty(source_reference, "来源批号")?;

        let lock = self.locks.lock_for(guard.batch_id());
        let _held = KeyedLocks::acquire(&lock);

        check_source_availability(
            self.sources.as_ref(),
            &self.batch_repo,
            source_reference.trim(),
            quantity,
        )?;

        let mut batch = self.load_batch(guard.batch_id())?;
        let requirements = self.requirements(&batch)?;
        let command = ConsumptionCommand::manual(
            guard.ingredient_name(),
            source_reference,
            quantity,
            operator,
        )
        .with_kind(kind);

        let entry = self
            .controller
            .record_consumption(&mut batch, &requirements, command)
            .inspect_err(|e| {
                warn!(batch_id = %batch.batch_id, ingredient = %guard.ingredient_name(), error = %e, "投料被拒绝");
            })?;
        self.batch_repo.save(&batch)?;

        info!(
            run_id = %batch.run_id,
            batch_id = %batch.batch_id,
            ingredient = %entry.ingredient_name,
            quantity = entry.quantity,
            kind = %entry.kind,
            "投料已记录"
        );
        self.audit(
            ActionLog::new(ActionType::RecordConsumption, operator)
                .with_run(&batch.run_id)
                .with_batch(&batch.batch_id)
                .with_payload(&entry),
        );
        Ok(entry)
    }

    /// 人工签核 / 撤销签核
    pub fn set_weighing_finished(
        &self,
        batch_id: &str,
        ingredient_name: &str,
        finished: bool,
        operator: &str,
    ) -> ApiResult<()> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(ingredient_name, "配料名称")?;
        require_non_empty(operator, "操作人")?;

        let guard = self.markers.try_acquire(batch_id, ingredient_name)?;
        self.set_weighing_finished_held(&guard, finished, operator)
    }

    fn set_weighing_finished_held(
        &self,
        guard: &ProcessingGuard,
        finished: bool,
        operator: &str,
    ) -> ApiResult<()> {
        let lock = self.locks.lock_for(guard.batch_id());
        let _held = KeyedLocks::acquire(&lock);

        let mut batch = self.load_batch(guard.batch_id())?;
        let requirements = self.requirements(&batch)?;
        self.controller.set_weighing_finished(
            &mut batch,
            &requirements,
            guard.ingredient_name(),
            finished,
        )?;
        self.batch_repo.save(&batch)?;

        info!(
            batch_id = %batch.batch_id,
            ingredient = %guard.ingredient_name(),
            finished,
            "签核状态已更新"
        );
        self.audit(
            ActionLog::new(ActionType::SetWeighingFinished, operator)
                .with_run(&batch.run_id)
                .with_batch(&batch.batch_id)
                .with_payload(&serde_json::json!({
                    "ingredient_name": guard.ingredient_name(),
                    "finished": finished,
                })),
        );
        Ok(())
    }

    /// 作废投料记录 (同时撤销该配料的签核)
    pub fn annul(&self, batch_id: &str, entry_id: &str, operator: &str) -> ApiResult<ConsumptionEntry> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(entry_id, "投料记录ID")?;
        require_non_empty(operator, "操作人")?;

        let lock = self.locks.lock_for(batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut batch = self.load_batch(batch_id)?;
        let ingredient_name = batch
            .ledger
            .find(entry_id)
            .map(|e| e.ingredient_name.clone())
            .ok_or_else(|| ApiError::NotFound(format!("ConsumptionEntry(id={})不存在", entry_id)))?;
        let _marker = self.markers.try_acquire(batch_id, &ingredient_name)?;

        let annulled = self.controller.annul(&mut batch, entry_id).inspect_err(|e| {
            warn!(batch_id = %batch_id, entry_id = %entry_id, error = %e, "作废被拒绝");
        })?;
        self.batch_repo.save(&batch)?;

        info!(
            batch_id = %batch_id,
            entry_id = %entry_id,
            ingredient = %annulled.ingredient_name,
            "投料记录已作废"
        );
        self.audit(
            ActionLog::new(ActionType::AnnulConsumption, operator)
                .with_run(&batch.run_id)
                .with_batch(batch_id)
                .with_payload(&annulled),
        );
        Ok(annulled)
    }

    // ==========================================
    // 质量确认 (化验协作方推送)
    // ==========================================

    /// 写入 NIRS 结果 (ok / nok)
    pub fn set_nirs(&self, batch_id: &str, result: NirsStatus, operator: &str) -> ApiResult<()> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(operator, "操作人")?;

        let lock = self.locks.lock_for(batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut batch = self.load_batch(batch_id)?;
        let adjustments = self.adjustment_repo.find_by_batch(batch_id)?;
        self.gate
            .set_nirs(&mut batch, result, &adjustments)
            .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "NIRS 结果被拒绝"))?;
        self.batch_repo.save(&batch)?;

        info!(
            batch_id = %batch_id,
            nirs = %result,
            sequence = batch.confirmation.nirs_sequence,
            "NIRS 结果已记录"
        );
        self.audit(
            ActionLog::new(ActionType::SetNirs, operator)
                .with_run(&batch.run_id)
                .with_batch(batch_id)
                .with_payload(&batch.confirmation),
        );
        Ok(())
    }

    /// 写入取样完成
    pub fn set_sampling_ok(&self, batch_id: &str, operator: &str) -> ApiResult<()> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(operator, "操作人")?;

        let lock = self.locks.lock_for(batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut batch = self.load_batch(batch_id)?;
        self.gate
            .set_sampling_ok(&mut batch)
            .inspect_err(|e| warn!(batch_id = %batch_id, error = %e, "取样状态被拒绝"))?;
        self.batch_repo.save(&batch)?;

        info!(batch_id = %batch_id, "取样已确认");
        self.audit(
            ActionLog::new(ActionType::SetSampling, operator)
                .with_run(&batch.run_id)
                .with_batch(batch_id)
                .with_payload(&batch.confirmation),
        );
        Ok(())
    }

    // ==========================================
    // 关闭批次
    // ==========================================

    /// 请求关闭批次
    ///
    /// # 返回
    /// - Err(BatchCloseRejected): 携带全部阻断项
    pub fn request_close(&self, batch_id: &str, operator: &str) -> ApiResult<Batch> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(operator, "操作人")?;

        let lock = self.locks.lock_for(batch_id);
        let _held = KeyedLocks::acquire(&lock);

        let mut batch = self.load_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        let adjustments = self.adjustment_repo.find_by_batch(batch_id)?;
        let verdict = self.gate.evaluate(&batch, &adjustments);

        if let Err(e) = self.controller.request_close(&mut batch, &requirements, &verdict) {
            warn!(batch_id = %batch_id, reason = %e, "批次关闭被拒绝");
            return Err(e.into());
        }
        self.batch_repo.save(&batch)?;

        info!(run_id = %batch.run_id, batch_id = %batch_id, batch_number = batch.batch_number, "批次已关闭");
        self.audit(
            ActionLog::new(ActionType::CloseBatch, operator)
                .with_run(&batch.run_id)
                .with_batch(batch_id)
                .with_payload(&serde_json::json!({
                    "batch_number": batch.batch_number,
                    "nirs": batch.confirmation.nirs,
                    "nirs_sequence": batch.confirmation.nirs_sequence,
                })),
        );
        Ok(batch)
    }

    // ==========================================
    // 查询接口
    // ==========================================

    pub fn get_batch(&self, batch_id: &str) -> ApiResult<Batch> {
        require_non_empty(batch_id, "批次ID")?;
        self.load_batch(batch_id)
    }

    /// 每种配料的进度
    pub fn ingredient_progress(&self, batch_id: &str) -> ApiResult<Vec<IngredientProgress>> {
        let batch = self.get_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        Ok(self.controller.ingredient_progress(&batch, &requirements))
    }

    /// 每种配方配料的有效投料量 (未投料的配料为 0)
    pub fn effective_consumption(&self, batch_id: &str) -> ApiResult<HashMap<String, f64>> {
        let batch = self.get_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        Ok(requirements
            .iter()
            .map(|r| {
                (
                    r.ingredient_name.clone(),
                    batch.ledger.effective_quantity(&r.ingredient_name),
                )
            })
            .collect())
    }

    /// 每种配料的未满足量 (按配方顺序)
    pub fn shortfalls(&self, batch_id: &str) -> ApiResult<Vec<IngredientShortfall>> {
        let batch = self.get_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        Ok(requirements
            .iter()
            .filter_map(|r| {
                self.controller
                    .shortfall(&batch, &requirements, &r.ingredient_name)
                    .map(|shortfall| IngredientShortfall {
                        ingredient_name: r.ingredient_name.clone(),
                        shortfall,
                    })
            })
            .collect())
    }

    /// 关闭条件评估 (不改变状态)
    pub fn close_eligibility(&self, batch_id: &str) -> ApiResult<CloseReport> {
        let batch = self.get_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        let adjustments = self.adjustment_repo.find_by_batch(batch_id)?;
        let verdict = self.gate.evaluate(&batch, &adjustments);
        Ok(self.controller.evaluate_close(&batch, &requirements, &verdict))
    }

    pub fn batch_summary(&self, batch_id: &str) -> ApiResult<BatchSummary> {
        let batch = self.get_batch(batch_id)?;
        let requirements = self.requirements(&batch)?;
        let adjustments = self.adjustment_repo.find_by_batch(batch_id)?;
        let verdict = self.gate.evaluate(&batch, &adjustments);

        Ok(BatchSummary {
            ingredients: self.controller.ingredient_progress(&batch, &requirements),
            close_report: self.controller.evaluate_close(&batch, &requirements, &verdict),
            batch_id: batch.batch_id,
            run_id: batch.run_id,
            batch_number: batch.batch_number,
            status: batch.status,
            target_weight: batch.target_weight,
            nirs: batch.confirmation.nirs,
            sampling: batch.confirmation.sampling,
            adjustments,
        })
    }

    /// 批次操作历史 (按时间正序)
    pub fn action_history(&self, batch_id: &str) -> ApiResult<Vec<ActionLog>> {
        require_non_empty(batch_id, "批次ID")?;
        Ok(self.action_log_repo.find_by_batch(batch_id)?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn load_batch(&self, batch_id: &str) -> ApiResult<Batch> {
        self.batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Batch(id={})不存在", batch_id)))
    }

    /// 按批次目标重量缩放配方
    fn requirements(&self, batch: &Batch) -> ApiResult<Vec<ScaledRequirement>> {
        let recipe_id = self
            .batch_repo
            .find_recipe_id(&batch.batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Batch(id={})的任务不存在", batch.batch_id)))?;
        let recipe = self
            .recipes
            .find_recipe(&recipe_id)
            .map_err(|e| ApiError::External(format!("配方查询失败: {}", e)))?
            .ok_or_else(|| ApiError::NotFound(format!("Recipe(id={})不存在", recipe_id)))?;
        Ok(self.scaler.scale(&recipe, batch.target_weight))
    }

    /// 来源物料校验: 未知批号为外部错误, 冻结或超出可用量为输入错误
    fn audit(&self, log: ActionLog) {
        if let Err(e) = self.action_log_repo.insert(&log) {
            warn!("记录操作日志失败: {}", e);
        }
    }
}

// ==========================================
// 自动称重站实现
// ==========================================
impl WeighingStation for BatchApi {
    fn ingredient_progress(&self, batch_id: &str) -> anyhow::Result<Vec<IngredientProgress>> {
        Ok(BatchApi::ingredient_progress(self, batch_id)?)
    }

    fn processing_markers(&self) -> &ProcessingMarkers {
        &self.markers
    }

    fn record_weighed(
        &self,
        guard: &ProcessingGuard,
        source_reference: &str,
        quantity: f64,
        operator: &str,
    ) -> anyhow::Result<()> {
        self.record_consumption_held(guard, source_reference, quantity, ConsumptionKind::Auto, operator)?;
        Ok(())
    }

    fn set_weighing_finished(&self, guard: &ProcessingGuard, operator: &str) -> anyhow::Result<()> {
        self.set_weighing_finished_held(guard, true, operator)?;
        Ok(())
    }
}

/// 来源物料校验
///
/// 规则:
/// - 批号必须存在 (查询失败或不存在 → External)
/// - 批号未冻结
/// - 正向领用: 全部批次未作废的领用合计 + 本次请求不得超过入库可用量
/// - 负向更正归还物料, 不做可用量校验
pub(crate) fn check_source_availability(
    sources: &dyn SourceMaterialLookup,
    batch_repo: &BatchRepository,
    source_reference: &str,
    quantity: f64,
) -> ApiResult<()> {
    let source = sources
        .find_source(source_reference)
        .map_err(|e| ApiError::External(format!("来源物料查询失败: {}", e)))?
        .ok_or_else(|| ApiError::External(format!("来源物料 {} 不存在", source_reference)))?;

    if source.blocked {
        return Err(ApiError::InvalidInput(format!(
            "来源物料 {} 已冻结",
            source_reference
        )));
    }
    if quantity <= 0.0 {
        return Ok(());
    }

    let drawn = batch_repo.drawn_from_source(source_reference)?;
    let remaining = source.available_quantity - drawn;
    if quantity > remaining + QUANTITY_EPSILON {
        return Err(ApiError::InvalidInput(format!(
            "来源物料 {} 剩余可用量 {:.3}kg 不足 (入库 {:.3}kg, 已领用 {:.3}kg, 请求 {:.3}kg)",
            source_reference, remaining, source.available_quantity, drawn, quantity
        )));
    }
    Ok(())
}

pub(crate) fn require_non_empty(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}

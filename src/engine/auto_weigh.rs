// ==========================================
// 配料批次执行系统 - 自动称重控制环
// ==========================================
// 单飞行协作式循环:
//   1. 选出第一个未签核且未被处理的配料
//   2. 获取处理中标记
//   3. 等待称重 (可被禁用信号立即打断)
//   4. 记录投料 → 签核
// 称重站的同步读写在阻塞线程池执行, 不占用异步工作线程
// 红线: 禁用或投料失败时立即停止推进, 已完成的步骤不回滚
// 红线: 等待期间被禁用, 不写入待定投料
// ==========================================

use crate::engine::batch_controller::{IngredientProgress, QUANTITY_EPSILON};
use crate::engine::processing::{ProcessingGuard, ProcessingMarkers};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ==========================================
// 协作方接口
// ==========================================

/// 称重站: 控制环对批次的读写面
///
/// 写入方法要求调用方持有该配料的处理中标记
pub trait WeighingStation: Send + Sync {
    fn ingredient_progress(&self, batch_id: &str) -> anyhow::Result<Vec<IngredientProgress>>;

    fn processing_markers(&self) -> &ProcessingMarkers;

    fn record_weighed(
        &self,
        guard: &ProcessingGuard,
        source_reference: &str,
        quantity: f64,
        operator: &str,
    ) -> anyhow::Result<()>;

    fn set_weighing_finished(&self, guard: &ProcessingGuard, operator: &str) -> anyhow::Result<()>;
}

/// 称重读数
#[derive(Debug, Clone, PartialEq)]
pub struct WeighingReading {
    pub quantity: f64,
    pub source_reference: String,
}

/// 称重设备 (设备本身不在范围内, 只消费其读数)
#[async_trait]
pub trait WeighingDevice: Send + Sync {
    async fn weigh(&self, ingredient_name: &str, target_quantity: f64) -> anyhow::Result<WeighingReading>;
}

// ==========================================
// SimulatedScale - 固定延迟的模拟秤
// ==========================================
#[derive(Debug, Clone)]
pub struct SimulatedScale {
    latency: Duration,
    source_reference: String,
}

impl SimulatedScale {
    pub fn new(latency: Duration, source_reference: &str) -> Self {
        Self {
            latency,
            source_reference: source_reference.to_string(),
        }
    }
}

#[async_trait]
impl WeighingDevice for SimulatedScale {
    async fn weigh(&self, _ingredient_name: &str, target_quantity: f64) -> anyhow::Result<WeighingReading> {
        tokio::time::sleep(self.latency).await;
        Ok(WeighingReading {
            quantity: target_quantity,
            source_reference: self.source_reference.clone(),
        })
    }
}

// ==========================================
// 运行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum AutoWeighStop {
    /// 全部配料已签核
    AllFinished,
    /// 被禁用
    Disabled,
    /// 剩余配料均被其他路径占用
    Blocked,
    /// 称重或投料失败
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoWeighReport {
    pub batch_id: String,
    pub processed: Vec<String>,
    pub stop: AutoWeighStop,
}

enum StepOutcome {
    Weighed(String),
    AllFinished,
    Blocked,
    Disabled,
}

// ==========================================
// AutoWeighLoop - 自动称重控制环
// ==========================================
pub struct AutoWeighLoop {
    station: Arc<dyn WeighingStation>,
    device: Arc<dyn WeighingDevice>,
    batch_id: String,
    operator: String,
    enabled: watch::Receiver<bool>,
}

impl AutoWeighLoop {
    pub fn new(
        station: Arc<dyn WeighingStation>,
        device: Arc<dyn WeighingDevice>,
        batch_id: &str,
        operator: &str,
        enabled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            station,
            device,
            batch_id: batch_id.to_string(),
            operator: operator.to_string(),
            enabled,
        }
    }

    fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// 运行直到停止条件出现
    pub async fn run(mut self) -> AutoWeighReport {
        let mut processed = Vec::new();

        let stop = loop {
            if !self.is_enabled() {
                break AutoWeighStop::Disabled;
            }
            match self.step().await {
                Ok(StepOutcome::Weighed(name)) => processed.push(name),
                Ok(StepOutcome::AllFinished) => break AutoWeighStop::AllFinished,
                Ok(StepOutcome::Blocked) => break AutoWeighStop::Blocked,
                Ok(StepOutcome::Disabled) => break AutoWeighStop::Disabled,
                Err(e) => {
                    tracing::warn!(batch_id = %self.batch_id, error = %e, "自动称重步骤失败");
                    break AutoWeighStop::Failed(e.to_string());
                }
            }
        };

        tracing::info!(
            batch_id = %self.batch_id,
            processed = processed.len(),
            stop = ?stop,
            "自动称重停止"
        );

        AutoWeighReport {
            batch_id: self.batch_id,
            processed,
            stop,
        }
    }

    async fn step(&mut self) -> anyhow::Result<StepOutcome> {
        let station = self.station.clone();
        let batch_id = self.batch_id.clone();
        let progress =
            tokio::task::spawn_blocking(move || station.ingredient_progress(&batch_id)).await??;
        let pending: Vec<IngredientProgress> =
            progress.into_iter().filter(|p| !p.weighing_finished).collect();
        if pending.is_empty() {
            return Ok(StepOutcome::AllFinished);
        }

        let markers = self.station.processing_markers().clone();
        let Some(candidate) = pending
            .into_iter()
            .find(|p| !markers.is_processing(&self.batch_id, &p.ingredient_name))
        else {
            return Ok(StepOutcome::Blocked);
        };
        let guard = match markers.try_acquire(&self.batch_id, &candidate.ingredient_name) {
            Ok(guard) => guard,
            Err(_) => return Ok(StepOutcome::Blocked),
        };

        let target = (candidate.required_quantity - candidate.consumed_quantity).max(0.0);
        tracing::debug!(
            batch_id = %self.batch_id,
            ingredient = %candidate.ingredient_name,
            target,
            "自动称重开始"
        );

        let reading = tokio::select! {
            biased;
            _ = wait_until_disabled(&mut self.enabled) => return Ok(StepOutcome::Disabled),
            reading = self.device.weigh(&candidate.ingredient_name, target) => reading?,
        };
        if !self.is_enabled() {
            return Ok(StepOutcome::Disabled);
        }

        // 标记随 guard 移入阻塞任务, 任务结束时释放
        let station = self.station.clone();
        let operator = self.operator.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if reading.quantity > QUANTITY_EPSILON {
                station.record_weighed(
                    &guard,
                    &reading.source_reference,
                    reading.quantity,
                    &operator,
                )?;
            }
            station.set_weighing_finished(&guard, &operator)
        })
        .await??;

        Ok(StepOutcome::Weighed(candidate.ingredient_name))
    }
}

/// 等待禁用信号; 发送端关闭视为禁用
pub async fn wait_until_disabled(enabled: &mut watch::Receiver<bool>) {
    loop {
        if !*enabled.borrow_and_update() {
            return;
        }
        if enabled.changed().await.is_err() {
            return;
        }
    }
}

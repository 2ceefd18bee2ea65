// ==========================================
// 配料批次执行系统 - 自动称重 API
// ==========================================
// 职责: 按批次启停自动称重控制环
// 每个批次至多一个运行中的控制环 (单飞行)
// 禁用: watch 信号置 false, 控制环在等待中被打断, 不写入待定投料
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::batch_api::{require_non_empty, BatchApi};
use crate::api::error::{ApiError, ApiResult};
use crate::engine::auto_weigh::{AutoWeighLoop, AutoWeighReport, WeighingDevice, WeighingStation};

struct AutoWeighSession {
    enabled: watch::Sender<bool>,
    handle: JoinHandle<AutoWeighReport>,
}

// ==========================================
// AutoWeighApi - 自动称重 API
// ==========================================
pub struct AutoWeighApi {
    batch_api: Arc<BatchApi>,
    device: Arc<dyn WeighingDevice>,
    sessions: Mutex<HashMap<String, AutoWeighSession>>,
}

impl AutoWeighApi {
    pub fn new(batch_api: Arc<BatchApi>, device: Arc<dyn WeighingDevice>) -> Self {
        Self {
            batch_api,
            device,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 启用自动称重 (需在 tokio 运行时内调用)
    ///
    /// 从第一个未签核且未被占用的配料继续
    pub fn enable(&self, batch_id: &str, operator: &str) -> ApiResult<()> {
        require_non_empty(batch_id, "批次ID")?;
        require_non_empty(operator, "操作人")?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ApiError::InternalError(format!("自动称重需要异步运行时: {}", e)))?;

        let batch = self.batch_api.get_batch(batch_id)?;
        if !batch.is_ongoing() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "批次 {} 状态为 {}, 仅投料中的批次可自动称重",
                batch.batch_number, batch.status
            )));
        }

        let mut sessions = self.lock_sessions()?;
        if let Some(existing) = sessions.get(batch_id) {
            if !existing.handle.is_finished() {
                return Err(ApiError::BusinessRuleViolation(format!(
                    "批次 {} 的自动称重已在运行",
                    batch.batch_number
                )));
            }
        }

        let (tx, rx) = watch::channel(true);
        let station: Arc<dyn WeighingStation> = self.batch_api.clone();
        let control_loop = AutoWeighLoop::new(station, self.device.clone(), batch_id, operator, rx);
        let handle = runtime.spawn(control_loop.run());
        sessions.insert(
            batch_id.to_string(),
            AutoWeighSession {
                enabled: tx,
                handle,
            },
        );

        info!(batch_id = %batch_id, operator = %operator, "自动称重已启用");
        Ok(())
    }

    /// 禁用自动称重 (切换到人工模式)
    ///
    /// # 返回
    /// 控制环的运行报告; 未启用时返回 None
    pub async fn disable(&self, batch_id: &str) -> ApiResult<Option<AutoWeighReport>> {
        let session = self.lock_sessions()?.remove(batch_id);
        let Some(session) = session else {
            return Ok(None);
        };

        session.enabled.send_replace(false);
        let report = Self::join(session.handle).await?;
        info!(batch_id = %batch_id, stop = ?report.stop, "自动称重已禁用");
        Ok(Some(report))
    }

    /// 等待控制环自然停止 (不发送禁用信号)
    pub async fn wait(&self, batch_id: &str) -> ApiResult<Option<AutoWeighReport>> {
        let session = self.lock_sessions()?.remove(batch_id);
        let Some(session) = session else {
            return Ok(None);
        };

        let report = Self::join(session.handle).await?;
        // 控制环已停止, 关闭信号通道
        drop(session.enabled);
        Ok(Some(report))
    }

    pub fn is_running(&self, batch_id: &str) -> bool {
        match self.sessions.lock() {
            Ok(sessions) => sessions
                .get(batch_id)
                .map(|s| !s.handle.is_finished())
                .unwrap_or(false),
            Err(e) => {
                warn!("锁获取失败: {}", e);
                false
            }
        }
    }

    async fn join(handle: JoinHandle<AutoWeighReport>) -> ApiResult<AutoWeighReport> {
        handle
            .await
            .map_err(|e| ApiError::InternalError(format!("自动称重任务异常退出: {}", e)))
    }

    fn lock_sessions(&self) -> ApiResult<std::sync::MutexGuard<'_, HashMap<String, AutoWeighSession>>> {
        self.sessions
            .lock()
            .map_err(|e| ApiError::InternalError(format!("锁获取失败: {}", e)))
    }
}

// ==========================================
// 配料批次执行系统 - 引擎层错误类型
// ==========================================
// 分类: 输入校验 / 状态转换 / 不变量 (带结构化原因) / 并发占用
// 工具: thiserror 派生宏
// 红线: 所有拒绝必须输出可解释的原因
// ==========================================

use crate::domain::types::{BatchStatus, NirsStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// CloseBlocker - 批次关闭阻断项
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseBlocker {
    /// 批次不在投料中
    BatchNotOngoing { status: BatchStatus },
    /// 配料短缺
    IngredientShort {
        ingredient_name: String,
        required_quantity: f64,
        consumed_quantity: f64,
        shortfall: f64,
    },
    /// NIRS 未出结果
    NirsPending,
    /// NIRS 不合格且无已完成的纠偏工单
    NirsRejected {
        nirs: NirsStatus,
        active_adjustment_id: Option<String>,
    },
    /// 未取样
    SamplingPending,
}

impl fmt::Display for CloseBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseBlocker::BatchNotOngoing { status } => {
                write!(f, "批次状态为 {}，不可关闭", status)
            }
            CloseBlocker::IngredientShort {
                ingredient_name,
                required_quantity,
                consumed_quantity,
                shortfall,
            } => write!(
                f,
                "配料 {} 短缺 {:.3}kg (需求 {:.3}kg, 已投 {:.3}kg)",
                ingredient_name, shortfall, required_quantity, consumed_quantity
            ),
            CloseBlocker::NirsPending => write!(f, "质量门未放行: NIRS 待检"),
            CloseBlocker::NirsRejected {
                active_adjustment_id: Some(id),
                ..
            } => write!(f, "质量门未放行: NIRS 不合格, 纠偏工单 {} 未完成", id),
            CloseBlocker::NirsRejected { .. } => {
                write!(f, "质量门未放行: NIRS 不合格, 需创建纠偏工单")
            }
            CloseBlocker::SamplingPending => write!(f, "质量门未放行: 未取样"),
        }
    }
}

// ==========================================
// CloseReport - 关闭校验报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseReport {
    pub batch_id: String,
    pub blockers: Vec<CloseBlocker>,
}

impl CloseReport {
    pub fn is_clear(&self) -> bool {
        self.blockers.is_empty()
    }

    /// 查询某配料的短缺量 (无短缺返回 None)
    pub fn shortfall_of(&self, ingredient_name: &str) -> Option<f64> {
        self.blockers.iter().find_map(|b| match b {
            CloseBlocker::IngredientShort {
                ingredient_name: name,
                shortfall,
                ..
            } if name == ingredient_name => Some(*shortfall),
            _ => None,
        })
    }

    /// 质量门是否阻断
    pub fn has_quality_blocker(&self) -> bool {
        self.blockers.iter().any(|b| {
            matches!(
                b,
                CloseBlocker::NirsPending
                    | CloseBlocker::NirsRejected { .. }
                    | CloseBlocker::SamplingPending
            )
        })
    }
}

impl fmt::Display for CloseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.blockers.iter().map(|b| b.to_string()).collect();
        write!(f, "batch_id={}: {}", self.batch_id, parts.join("; "))
    }
}

// ==========================================
// ExecutionError - 引擎层错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    // ===== 输入校验 =====
    #[error("数据验证失败: {0}")]
    Validation(String),

    // ===== 状态机 =====
    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    // ===== 不变量 =====
    #[error("批次关闭条件不满足: {0}")]
    CloseRejected(CloseReport),

    #[error("任务关闭条件不满足: 批次 {open_batches:?} 未完成")]
    RunCloseRejected { open_batches: Vec<u32> },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ===== 并发占用 =====
    #[error("配料正在处理中: batch_id={batch_id}, ingredient={ingredient_name}")]
    IngredientBusy {
        batch_id: String,
        ingredient_name: String,
    },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },
}

impl ExecutionError {
    pub(crate) fn transition(entity: &str, from: impl fmt::Display, to: impl fmt::Display) -> Self {
        ExecutionError::InvalidStateTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Result 类型别名
pub type ExecutionResult<T> = Result<T, ExecutionError>;

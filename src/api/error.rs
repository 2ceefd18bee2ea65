// ==========================================
// 配料批次执行系统 - API层错误类型
// ==========================================
// 职责: 统一命令面的失败结果, 转换引擎/仓储错误为可展示的原因
// 分类: 输入校验 / 不变量 (带结构化原因) / 外部协作方失败
// ==========================================

use crate::engine::error::{CloseReport, ExecutionError};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入与状态
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    // ==========================================
    // 不变量
    // ==========================================
    /// 批次关闭被拒 (全部阻断项)
    #[error("批次关闭条件不满足: {0}")]
    BatchCloseRejected(CloseReport),

    #[error("任务关闭条件不满足: 批次 {open_batches:?} 未完成")]
    RunCloseRejected { open_batches: Vec<u32> },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("配料正在处理中: batch_id={batch_id}, ingredient={ingredient_name}")]
    IngredientBusy {
        batch_id: String,
        ingredient_name: String,
    },

    // ==========================================
    // 外部协作方
    // ==========================================
    /// 协作方调用失败, 原样透出
    #[error("外部协作方失败: {0}")]
    External(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("文件导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Validation(msg) => ApiError::InvalidInput(msg),
            ExecutionError::InvalidStateTransition { entity, from, to } => {
                ApiError::InvalidStateTransition { entity, from, to }
            }
            ExecutionError::CloseRejected(report) => ApiError::BatchCloseRejected(report),
            ExecutionError::RunCloseRejected { open_batches } => {
                ApiError::RunCloseRejected { open_batches }
            }
            ExecutionError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            ExecutionError::IngredientBusy {
                batch_id,
                ingredient_name,
            } => ApiError::IngredientBusy {
                batch_id,
                ingredient_name,
            },
            ExecutionError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}的值错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(e) => ApiError::Other(e),
        }
    }
}

/// API层Result类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::CloseBlocker;

    #[test]
    fn test_close_rejection_keeps_structured_reason() {
        let report = CloseReport {
            batch_id: "B1".to_string(),
            blockers: vec![CloseBlocker::NirsPending],
        };
        let api_err: ApiError = ExecutionError::CloseRejected(report.clone()).into();
        match api_err {
            ApiError::BatchCloseRejected(r) => assert_eq!(r, report),
            other => panic!("Expected BatchCloseRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_repository_not_found_conversion() {
        let api_err: ApiError = RepositoryError::not_found("Batch", "B9").into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Batch"));
                assert!(msg.contains("B9"));
            }
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_validation_maps_to_invalid_input() {
        let api_err: ApiError = ExecutionError::Validation("数量无效".to_string()).into();
        assert!(matches!(api_err, ApiError::InvalidInput(_)));
    }
}

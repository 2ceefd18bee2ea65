// ==========================================
// 配料批次执行系统 - 应用层
// ==========================================
// 职责: 装配共享连接、仓储与API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};

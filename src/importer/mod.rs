// ==========================================
// 配料批次执行系统 - 导入层
// ==========================================
// 职责: 外部配方数据导入
// 支持: CSV
// ==========================================

pub mod error;
pub mod recipe_csv;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use recipe_csv::RecipeCsvParser;

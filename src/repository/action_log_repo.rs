// ==========================================
// 配料批次执行系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有被接受的写入命令必须记录
// ==========================================

mod core;
mod queries;


pub use self::core::ActionLogRepository;

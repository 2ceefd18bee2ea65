// ==========================================
// 配料批次执行系统 - 领域类型定义
// ==========================================
// 职责: 生产任务/批次/质量/纠偏工单的状态枚举
// 约定: 数据库存储使用 snake_case 字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 生产任务状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planned,   // 已计划
    Ongoing,   // 生产中
    Paused,    // 暂停
    Completed, // 已完成
}

impl RunStatus {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunStatus::Planned => "planned",
            RunStatus::Ongoing => "ongoing",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
        }
    }

    /// 从字符串解析状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(RunStatus::Planned),
            "ongoing" => Some(RunStatus::Ongoing),
            "paused" => Some(RunStatus::Paused),
            "completed" => Some(RunStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Planned,   // 待投料
    Ongoing,   // 投料中
    Completed, // 已关闭
}

impl BatchStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BatchStatus::Planned => "planned",
            BatchStatus::Ongoing => "ongoing",
            BatchStatus::Completed => "completed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(BatchStatus::Planned),
            "ongoing" => Some(BatchStatus::Ongoing),
            "completed" => Some(BatchStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// NIRS 分析结果 (近红外放行)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NirsStatus {
    Pending, // 待检
    Ok,      // 合格
    Nok,     // 不合格
}

impl NirsStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            NirsStatus::Pending => "pending",
            NirsStatus::Ok => "ok",
            NirsStatus::Nok => "nok",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NirsStatus::Pending),
            "ok" => Some(NirsStatus::Ok),
            "nok" => Some(NirsStatus::Nok),
            _ => None,
        }
    }
}

impl fmt::Display for NirsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 取样状态 (无失败态)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStatus {
    Pending, // 未取样
    Ok,      // 已取样
}

impl SamplingStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SamplingStatus::Pending => "pending",
            SamplingStatus::Ok => "ok",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SamplingStatus::Pending),
            "ok" => Some(SamplingStatus::Ok),
            _ => None,
        }
    }
}

impl fmt::Display for SamplingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 纠偏工单状态 (Adjustment Status)
// ==========================================
// 终态: Completed / Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Planned,         // 已创建
    MaterialPicking, // 备料中
    Processing,      // 备料完成,待投料
    Completed,       // 已投料
    Cancelled,       // 已取消
}

impl AdjustmentStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Planned => "planned",
            AdjustmentStatus::MaterialPicking => "material_picking",
            AdjustmentStatus::Processing => "processing",
            AdjustmentStatus::Completed => "completed",
            AdjustmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(AdjustmentStatus::Planned),
            "material_picking" => Some(AdjustmentStatus::MaterialPicking),
            "processing" => Some(AdjustmentStatus::Processing),
            "completed" => Some(AdjustmentStatus::Completed),
            "cancelled" => Some(AdjustmentStatus::Cancelled),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, AdjustmentStatus::Completed | AdjustmentStatus::Cancelled)
    }
}

impl fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 投料来源 (Consumption Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionKind {
    Manual,     // 人工录入
    Auto,       // 自动称重
    Adjustment, // 纠偏工单合并
}

impl ConsumptionKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConsumptionKind::Manual => "manual",
            ConsumptionKind::Auto => "auto",
            ConsumptionKind::Adjustment => "adjustment",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ConsumptionKind::Manual),
            "auto" => Some(ConsumptionKind::Auto),
            "adjustment" => Some(ConsumptionKind::Adjustment),
            _ => None,
        }
    }
}

impl fmt::Display for ConsumptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 生产事件类型 (Production Event Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionEventType {
    Problem,     // 问题
    Downtime,    // 停机
    ShiftChange, // 交接班
    Transition,  // 换产
    Breakdown,   // 故障
    Other,       // 其他
}

impl ProductionEventType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductionEventType::Problem => "problem",
            ProductionEventType::Downtime => "downtime",
            ProductionEventType::ShiftChange => "shift_change",
            ProductionEventType::Transition => "transition",
            ProductionEventType::Breakdown => "breakdown",
            ProductionEventType::Other => "other",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "problem" => Some(ProductionEventType::Problem),
            "downtime" => Some(ProductionEventType::Downtime),
            "shift_change" => Some(ProductionEventType::ShiftChange),
            "transition" => Some(ProductionEventType::Transition),
            "breakdown" => Some(ProductionEventType::Breakdown),
            "other" => Some(ProductionEventType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ProductionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

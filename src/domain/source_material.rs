// ==========================================
// 配料批次执行系统 - 来源物料快照
// ==========================================
// 库存/库位属于外部协作方; 这里只保留投料校验所需的字段
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMaterial {
    pub source_reference: String, // 托盘/批号
    pub material_name: String,
    pub available_quantity: f64, // 入库量, 领用后不回写
    pub blocked: bool,
    pub location: Option<String>,
}

// ==========================================
// 配料批次执行系统 - 外部协作方接口
// ==========================================
// 引擎层定义 trait, 数据访问层实现
// 调用失败原样返回, 不做内部重试
// ==========================================

use crate::domain::recipe::Recipe;
use crate::domain::source_material::SourceMaterial;

/// 配方查询
pub trait RecipeLookup: Send + Sync {
    fn find_recipe(&self, recipe_id: &str) -> anyhow::Result<Option<Recipe>>;
}

/// 来源物料查询 (可用量/冻结/库位)
pub trait SourceMaterialLookup: Send + Sync {
    fn find_source(&self, source_reference: &str) -> anyhow::Result<Option<SourceMaterial>>;
}

// ==========================================
// 配料批次执行系统 - 配方缩放引擎
// ==========================================
// 输入: 配方未缩放配料表 + 批次目标重量
// 输出: 每种配料的单批次需求量
// 公式: required = unscaled × (target / Σunscaled)
// ==========================================
// 红线: Σunscaled 为 0 属于配置错误,返回空需求,不报错
// ==========================================

use crate::domain::recipe::{Recipe, ScaledRequirement};

// ==========================================
// RecipeScaler - 配方缩放引擎
// ==========================================
/// 无状态引擎,不需要注入依赖
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeScaler;

impl RecipeScaler {
    pub fn new() -> Self {
        Self
    }

    /// 按批次目标重量缩放配方
    ///
    /// # 返回
    /// - 按配方顺序的需求列表
    /// - 配方合计为 0 (或目标重量非法) 时返回空列表
    pub fn scale(&self, recipe: &Recipe, target_batch_weight: f64) -> Vec<ScaledRequirement> {
        let total = recipe.total_unscaled();
        if total <= 0.0 || !total.is_finite() {
            tracing::warn!(
                recipe_id = %recipe.recipe_id,
                total_unscaled = total,
                "配方用量合计非正,视为无配料需求"
            );
            return Vec::new();
        }
        if !target_batch_weight.is_finite() || target_batch_weight < 0.0 {
            tracing::warn!(
                recipe_id = %recipe.recipe_id,
                target_batch_weight,
                "批次目标重量非法,视为无配料需求"
            );
            return Vec::new();
        }

        let factor = target_batch_weight / total;
        recipe
            .ingredients
            .iter()
            .map(|i| ScaledRequirement {
                ingredient_name: i.ingredient_name.clone(),
                required_quantity: i.unscaled_quantity * factor,
            })
            .collect()
    }

    /// 查询单个配料的需求量
    pub fn requirement_for(
        &self,
        recipe: &Recipe,
        target_batch_weight: f64,
        ingredient_name: &str,
    ) -> Option<f64> {
        self.scale(recipe, target_batch_weight)
            .into_iter()
            .find(|r| r.ingredient_name == ingredient_name)
            .map(|r| r.required_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recipe::RecipeIngredient;

    fn recipe(items: &[(&str, f64)]) -> Recipe {
        Recipe::new(
            "R1",
            "测试配方",
            items
                .iter()
                .map(|(n, q)| RecipeIngredient::new(n, *q))
                .collect(),
        )
    }

    #[test]
    fn test_scale_two_ingredients() {
        let scaler = RecipeScaler::new();
        let r = recipe(&[("A", 600.0), ("B", 400.0)]);

        let scaled = scaler.scale(&r, 500.0);
        assert_eq!(scaled.len(), 2);
        assert_eq!(scaled[0].ingredient_name, "A");
        assert_eq!(scaled[0].required_quantity, 300.0);
        assert_eq!(scaled[1].required_quantity, 200.0);
    }

    #[test]
    fn test_scaled_sum_equals_target() {
        let scaler = RecipeScaler::new();
        let recipes = [
            recipe(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]),
            recipe(&[("A", 0.37), ("B", 12.5), ("C", 7.13), ("D", 0.001)]),
            recipe(&[("A", 42.0)]),
        ];
        let targets = [1.0, 333.3, 1000.0, 2468.75];

        for r in &recipes {
            for target in targets {
                let sum: f64 = scaler
                    .scale(r, target)
                    .iter()
                    .map(|s| s.required_quantity)
                    .sum();
                assert!((sum - target).abs() < 1e-6, "sum={} target={}", sum, target);
            }
        }
    }

    #[test]
    fn test_zero_sum_recipe_yields_no_requirements() {
        let scaler = RecipeScaler::new();
        let r = recipe(&[("A", 0.0), ("B", 0.0)]);
        assert!(scaler.scale(&r, 500.0).is_empty());

        let empty = recipe(&[]);
        assert!(scaler.scale(&empty, 500.0).is_empty());
    }

    #[test]
    fn test_requirement_for() {
        let scaler = RecipeScaler::new();
        let r = recipe(&[("A", 600.0), ("B", 400.0)]);
        assert_eq!(scaler.requirement_for(&r, 500.0, "B"), Some(200.0));
        assert_eq!(scaler.requirement_for(&r, 500.0, "Z"), None);
    }
}

// ==========================================
// 配料批次执行系统 - 配方领域模型
// ==========================================
// 配方为只读参考数据: 有序的 (配料名, 未缩放用量) 列表
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Recipe - 配方
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: String,
    pub recipe_name: String,
    pub ingredients: Vec<RecipeIngredient>, // 顺序即投料顺序
}

/// 配方配料行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub ingredient_name: String,
    pub unscaled_quantity: f64,
}

/// 缩放后的单批次需求量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledRequirement {
    pub ingredient_name: String,
    pub required_quantity: f64,
}

impl Recipe {
    pub fn new(recipe_id: &str, recipe_name: &str, ingredients: Vec<RecipeIngredient>) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            recipe_name: recipe_name.to_string(),
            ingredients,
        }
    }

    /// 未缩放用量合计
    pub fn total_unscaled(&self) -> f64 {
        self.ingredients.iter().map(|i| i.unscaled_quantity).sum()
    }

    /// 配料名 (按配方顺序)
    pub fn ingredient_names(&self) -> Vec<&str> {
        self.ingredients
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect()
    }

    pub fn contains(&self, ingredient_name: &str) -> bool {
        self.ingredients
            .iter()
            .any(|i| i.ingredient_name == ingredient_name)
    }
}

impl RecipeIngredient {
    pub fn new(ingredient_name: &str, unscaled_quantity: f64) -> Self {
        Self {
            ingredient_name: ingredient_name.to_string(),
            unscaled_quantity,
        }
    }
}

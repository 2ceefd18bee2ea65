// ==========================================
// 配料批次执行系统 - 配方 CSV 解析
// ==========================================
// 格式: recipe_id,recipe_name,ingredient_name,quantity (带表头)
// 同一 recipe_id 的行归为一个配方, 保持行顺序 (即投料顺序)
// ==========================================

use crate::domain::recipe::{Recipe, RecipeIngredient};
use crate::importer::error::{ImportError, ImportResult};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 4] = ["recipe_id", "recipe_name", "ingredient_name", "quantity"];

// ==========================================
// RecipeCsvParser
// ==========================================
pub struct RecipeCsvParser;

impl RecipeCsvParser {
    /// 从文件解析配方
    pub fn parse_file(file_path: &Path) -> ImportResult<Vec<Recipe>> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }
        match file_path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => {}
            _ => {
                return Err(ImportError::UnsupportedFormat(
                    file_path.display().to_string(),
                ))
            }
        }

        let file = File::open(file_path)?;
        Self::parse_reader(file)
    }

    /// 从任意读取源解析配方
    pub fn parse_reader<R: Read>(source: R) -> ImportResult<Vec<Recipe>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        let mut index = HashMap::new();
        for column in REQUIRED_COLUMNS {
            let pos = headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| ImportError::MissingColumn(column.to_string()))?;
            index.insert(column, pos);
        }

        let mut recipes: Vec<Recipe> = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            // 表头为第 1 行
            let row = row_idx + 2;
            let field = |name: &str| -> ImportResult<String> {
                let value = index
                    .get(name)
                    .and_then(|pos| record.get(*pos))
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if value.is_empty() {
                    return Err(ImportError::EmptyField {
                        row,
                        field: name.to_string(),
                    });
                }
                Ok(value)
            };

            let recipe_id = field("recipe_id")?;
            let recipe_name = field("recipe_name")?;
            let ingredient_name = field("ingredient_name")?;
            let raw_quantity = field("quantity")?;

            let quantity: f64 = raw_quantity.parse().map_err(|_| ImportError::TypeConversionError {
                row,
                field: "quantity".to_string(),
                message: format!("无法解析为数字: {}", raw_quantity),
            })?;
            if !quantity.is_finite() {
                return Err(ImportError::TypeConversionError {
                    row,
                    field: "quantity".to_string(),
                    message: format!("非有限数值: {}", raw_quantity),
                });
            }
            if quantity < 0.0 {
                return Err(ImportError::NegativeValue {
                    row,
                    field: "quantity".to_string(),
                    value: quantity,
                });
            }

            let recipe = match recipes.iter().position(|r| r.recipe_id == recipe_id) {
                Some(pos) => &mut recipes[pos],
                None => {
                    recipes.push(Recipe::new(&recipe_id, &recipe_name, Vec::new()));
                    let last = recipes.len() - 1;
                    &mut recipes[last]
                }
            };
            if recipe.recipe_name != recipe_name {
                return Err(ImportError::InconsistentRecipeName {
                    row,
                    recipe_id,
                    expected: recipe.recipe_name.clone(),
                });
            }
            if recipe.contains(&ingredient_name) {
                return Err(ImportError::DuplicateIngredient {
                    row,
                    recipe_id,
                    ingredient_name,
                });
            }
            recipe
                .ingredients
                .push(RecipeIngredient::new(&ingredient_name, quantity));
        }

        if recipes.is_empty() {
            return Err(ImportError::EmptyFile);
        }
        Ok(recipes)
    }
}

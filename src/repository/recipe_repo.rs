// ==========================================
// 配料批次执行系统 - 配方数据仓储
// ==========================================
// 配方为只读参考数据: 只插入, 不覆盖
// 同时作为 RecipeLookup 协作方的实现
// ==========================================

use crate::db::format_datetime;
use crate::domain::recipe::{Recipe, RecipeIngredient};
use crate::engine::collaborators::RecipeLookup;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

pub struct RecipeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecipeRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入配方 (单事务; 任一失败全部回滚)
    ///
    /// # 返回
    /// - `Ok(count)`: 插入的配方数量
    /// - `Err(UniqueConstraintViolation)`: 配方ID已存在
    pub fn insert_all(&self, recipes: &[Recipe]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = format_datetime(&chrono::Utc::now().naive_utc());

        for recipe in recipes {
            tx.execute(
                "INSERT INTO recipe (recipe_id, recipe_name, created_at) VALUES (?1, ?2, ?3)",
                params![recipe.recipe_id, recipe.recipe_name, now],
            )?;
            for (seq, ingredient) in recipe.ingredients.iter().enumerate() {
                tx.execute(
                    r#"INSERT INTO recipe_ingredient (
                        recipe_id, seq_no, ingredient_name, unscaled_quantity
                    ) VALUES (?1, ?2, ?3, ?4)"#,
                    params![
                        recipe.recipe_id,
                        seq as i64,
                        ingredient.ingredient_name,
                        ingredient.unscaled_quantity
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(recipes.len())
    }

    pub fn insert(&self, recipe: &Recipe) -> RepositoryResult<()> {
        self.insert_all(std::slice::from_ref(recipe)).map(|_| ())
    }

    /// 按ID查询配方 (配料按 seq_no 排序)
    pub fn find_by_id(&self, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let conn = self.get_conn()?;
        Self::load(&conn, recipe_id)
    }

    /// 查询所有配方
    pub fn list_all(&self) -> RepositoryResult<Vec<Recipe>> {
        let conn = self.get_conn()?;
        let ids: Vec<String> = {
            let mut stmt = conn.prepare("SELECT recipe_id FROM recipe ORDER BY recipe_id")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<SqliteResult<Vec<String>>>()?;
            rows
        };

        let mut recipes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(recipe) = Self::load(&conn, &id)? {
                recipes.push(recipe);
            }
        }
        Ok(recipes)
    }

    fn load(conn: &Connection, recipe_id: &str) -> RepositoryResult<Option<Recipe>> {
        let name = match conn.query_row(
            "SELECT recipe_name FROM recipe WHERE recipe_id = ?1",
            params![recipe_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(name) => name,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stmt = conn.prepare(
            r#"SELECT ingredient_name, unscaled_quantity
               FROM recipe_ingredient
               WHERE recipe_id = ?1
               ORDER BY seq_no ASC"#,
        )?;
        let ingredients = stmt
            .query_map(params![recipe_id], |row| {
                Ok(RecipeIngredient {
                    ingredient_name: row.get(0)?,
                    unscaled_quantity: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(Some(Recipe {
            recipe_id: recipe_id.to_string(),
            recipe_name: name,
            ingredients,
        }))
    }
}

impl RecipeLookup for RecipeRepository {
    fn find_recipe(&self, recipe_id: &str) -> anyhow::Result<Option<Recipe>> {
        Ok(self.find_by_id(recipe_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> RecipeRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        RecipeRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_preserves_ingredient_order() {
        let repo = setup();
        let recipe = Recipe::new(
            "R1",
            "预混料",
            vec![
                RecipeIngredient::new("Z-盐", 5.0),
                RecipeIngredient::new("A-玉米", 600.0),
                RecipeIngredient::new("M-豆粕", 395.0),
            ],
        );
        repo.insert(&recipe).unwrap();

        let loaded = repo.find_by_id("R1").unwrap().unwrap();
        assert_eq!(loaded, recipe);
        assert!(repo.find_by_id("R2").unwrap().is_none());
        assert!(repo.find_recipe("R1").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_recipe_rolls_back_whole_import() {
        let repo = setup();
        repo.insert(&Recipe::new("R1", "a", vec![RecipeIngredient::new("A", 1.0)]))
            .unwrap();

        let err = repo
            .insert_all(&[
                Recipe::new("R2", "b", vec![RecipeIngredient::new("A", 1.0)]),
                Recipe::new("R1", "dup", vec![RecipeIngredient::new("A", 1.0)]),
            ])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }
}

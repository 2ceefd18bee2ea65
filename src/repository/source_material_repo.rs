// ==========================================
// 配料批次执行系统 - 来源物料数据仓储
// ==========================================
// 库存快照由外部库存系统同步写入; 本系统只读取用于投料校验
// available_quantity 为托盘入库量, 剩余量 = 入库量 - 台账中未作废的领用合计
// ==========================================

use crate::domain::source_material::SourceMaterial;
use crate::engine::collaborators::SourceMaterialLookup;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct SourceMaterialRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SourceMaterialRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入或更新库存快照
    pub fn upsert(&self, material: &SourceMaterial) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO source_material (
                source_reference, material_name, available_quantity, blocked, location
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(source_reference) DO UPDATE SET
                material_name = excluded.material_name,
                available_quantity = excluded.available_quantity,
                blocked = excluded.blocked,
                location = excluded.location"#,
            params![
                material.source_reference,
                material.material_name,
                material.available_quantity,
                material.blocked,
                material.location,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_reference(&self, source_reference: &str) -> RepositoryResult<Option<SourceMaterial>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            r#"SELECT source_reference, material_name, available_quantity, blocked, location
               FROM source_material WHERE source_reference = ?1"#,
            params![source_reference],
            Self::map_row,
        ) {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<SourceMaterial>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT source_reference, material_name, available_quantity, blocked, location
               FROM source_material ORDER BY source_reference"#,
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    fn map_row(row: &Row) -> SqliteResult<SourceMaterial> {
        Ok(SourceMaterial {
            source_reference: row.get(0)?,
            material_name: row.get(1)?,
            available_quantity: row.get(2)?,
            blocked: row.get(3)?,
            location: row.get(4)?,
        })
    }
}

impl SourceMaterialLookup for SourceMaterialRepository {
    fn find_source(&self, source_reference: &str) -> anyhow::Result<Option<SourceMaterial>> {
        Ok(self.find_by_reference(source_reference)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_lookup() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        let repo = SourceMaterialRepository::new(Arc::new(Mutex::new(conn)));

        let mut pallet = SourceMaterial {
            source_reference: "P-01".to_string(),
            material_name: "A".to_string(),
            available_quantity: 800.0,
            blocked: false,
            location: Some("WH1-03".to_string()),
        };
        repo.upsert(&pallet).unwrap();

        pallet.blocked = true;
        pallet.available_quantity = 750.0;
        repo.upsert(&pallet).unwrap();

        let found = repo.find_source("P-01").unwrap().unwrap();
        assert!(found.blocked);
        assert_eq!(found.available_quantity, 750.0);
        assert!(repo.find_source("P-99").unwrap().is_none());
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }
}

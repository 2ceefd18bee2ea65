// ==========================================
// 配料批次执行系统 - 纠偏工单数据仓储
// ==========================================
// 物料行以 JSON 存储 (materials_json)
// 合并投料: 工单完成与批次台账追加在同一事务内提交
// ==========================================

use crate::db::{format_datetime, invalid_column, parse_datetime, parse_optional_datetime};
use crate::domain::adjustment::{AdjustmentMaterial, AdjustmentOrder};
use crate::domain::batch::Batch;
use crate::domain::types::AdjustmentStatus;
use crate::repository::batch_repo::write_batch;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const ORDER_COLUMNS: &str = r#"
    SELECT adjustment_id, batch_id, status, materials_json, staging_location,
           nirs_sequence, created_by, created_at, completed_at
    FROM adjustment_order
"#;

pub struct AdjustmentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AdjustmentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, order: &AdjustmentOrder) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO adjustment_order (
                adjustment_id, batch_id, status, materials_json, staging_location,
                nirs_sequence, created_by, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                order.adjustment_id,
                order.batch_id,
                order.status.to_db_str(),
                serde_json::to_string(&order.materials)?,
                order.staging_location,
                order.nirs_sequence,
                order.created_by,
                format_datetime(&order.created_at),
                order.completed_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(order.adjustment_id.clone())
    }

    /// 更新工单状态/物料/暂存位
    pub fn update(&self, order: &AdjustmentOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        update_order(&conn, order)
    }

    /// 工单完成 + 批次台账追加 (单事务)
    pub fn complete_with_batch(&self, order: &AdjustmentOrder, batch: &Batch) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        update_order(&tx, order)?;
        write_batch(&tx, batch)?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_by_id(&self, adjustment_id: &str) -> RepositoryResult<Option<AdjustmentOrder>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                &format!("{} WHERE adjustment_id = ?1", ORDER_COLUMNS),
                params![adjustment_id],
                map_order_row,
            )
            .optional()?;
        Ok(order)
    }

    /// 查询批次的全部工单 (按创建顺序)
    pub fn find_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<AdjustmentOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE batch_id = ?1 ORDER BY created_at ASC, rowid ASC",
            ORDER_COLUMNS
        ))?;
        let orders = stmt
            .query_map(params![batch_id], map_order_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(orders)
    }
}

fn update_order(conn: &Connection, order: &AdjustmentOrder) -> RepositoryResult<()> {
    let rows = conn.execute(
        r#"UPDATE adjustment_order SET
            status = ?1, materials_json = ?2, staging_location = ?3, completed_at = ?4
           WHERE adjustment_id = ?5"#,
        params![
            order.status.to_db_str(),
            serde_json::to_string(&order.materials)?,
            order.staging_location,
            order.completed_at.as_ref().map(format_datetime),
            order.adjustment_id,
        ],
    )?;
    if rows == 0 {
        return Err(RepositoryError::not_found("AdjustmentOrder", &order.adjustment_id));
    }
    Ok(())
}

fn map_order_row(row: &Row) -> SqliteResult<AdjustmentOrder> {
    let status: String = row.get(2)?;
    let materials_json: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    let completed_at: Option<String> = row.get(8)?;

    let materials: Vec<AdjustmentMaterial> = serde_json::from_str(&materials_json)
        .map_err(|e| invalid_column(3, format!("materials_json: {}", e)))?;

    Ok(AdjustmentOrder {
        adjustment_id: row.get(0)?,
        batch_id: row.get(1)?,
        status: AdjustmentStatus::from_db_str(&status)
            .ok_or_else(|| invalid_column(2, format!("未知工单状态: {}", status)))?,
        materials,
        staging_location: row.get(4)?,
        nirs_sequence: row.get(5)?,
        created_by: row.get(6)?,
        created_at: parse_datetime(7, &created_at)?,
        completed_at: parse_optional_datetime(8, completed_at)?,
    })
}

// ==========================================
// 配料批次执行系统 - 生产事件数据仓储
// ==========================================

use crate::db::{format_datetime, invalid_column, parse_datetime};
use crate::domain::production_event::ProductionEvent;
use crate::domain::types::ProductionEventType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct ProductionEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionEventRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, event: &ProductionEvent) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO production_event (
                event_id, run_id, event_type, description, occurred_at, author
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                event.event_id,
                event.run_id,
                event.event_type.to_db_str(),
                event.description,
                format_datetime(&event.occurred_at),
                event.author,
            ],
        )?;
        Ok(event.event_id.clone())
    }

    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<ProductionEvent>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            r#"SELECT event_id, run_id, event_type, description, occurred_at, author
               FROM production_event WHERE event_id = ?1"#,
            params![event_id],
            map_event_row,
        ) {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询任务的生产事件 (按时间正序)
    pub fn find_by_run(&self, run_id: &str) -> RepositoryResult<Vec<ProductionEvent>> {
        let conn = self.get_conn()?;
        load_events_by_run(&conn, run_id)
    }

    /// 删除事件 (唯一允许的删除路径)
    pub fn delete(&self, event_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM production_event WHERE event_id = ?1",
            params![event_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProductionEvent", event_id));
        }
        Ok(())
    }
}

pub(crate) fn load_events_by_run(conn: &Connection, run_id: &str) -> RepositoryResult<Vec<ProductionEvent>> {
    let mut stmt = conn.prepare(
        r#"SELECT event_id, run_id, event_type, description, occurred_at, author
           FROM production_event
           WHERE run_id = ?1
           ORDER BY occurred_at ASC, rowid ASC"#,
    )?;
    let events = stmt
        .query_map(params![run_id], map_event_row)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(events)
}

fn map_event_row(row: &Row) -> SqliteResult<ProductionEvent> {
    let event_type: String = row.get(2)?;
    let occurred_at: String = row.get(4)?;

    Ok(ProductionEvent {
        event_id: row.get(0)?,
        run_id: row.get(1)?,
        event_type: ProductionEventType::from_db_str(&event_type)
            .ok_or_else(|| invalid_column(2, format!("未知事件类型: {}", event_type)))?,
        description: row.get(3)?,
        occurred_at: parse_datetime(4, &occurred_at)?,
        author: row.get(5)?,
    })
}

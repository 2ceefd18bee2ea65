// ==========================================
// 配料批次执行系统 - 生产任务数据仓储
// ==========================================
// 读取: 任务行 + 全部批次 (含台账) + 生产事件
// 写入: 初始化时任务与批次同一事务落库
// ==========================================

use crate::db::{format_datetime, invalid_column, parse_datetime, parse_optional_datetime};
use crate::domain::batch::Batch;
use crate::domain::run::Run;
use crate::domain::types::RunStatus;
use crate::repository::batch_repo::{load_batches_by_run, mark_started, write_batch};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::production_event_repo::load_events_by_run;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const RUN_COLUMNS: &str = r#"
    SELECT run_id, recipe_id, target_total_weight, batch_size, status,
           created_by, created_at, completed_at
    FROM production_run
"#;

// ==========================================
// RunRepository - 生产任务仓储
// ==========================================
pub struct RunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入任务及其全部批次 (单事务)
    pub fn insert(&self, run: &Run) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO production_run (
                run_id, recipe_id, target_total_weight, batch_size, status,
                created_by, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                run.run_id,
                run.recipe_id,
                run.target_total_weight,
                run.batch_size,
                run.status.to_db_str(),
                run.created_by,
                format_datetime(&run.created_at),
                run.completed_at.as_ref().map(format_datetime),
            ],
        )?;
        for batch in &run.batches {
            write_batch(&tx, batch)?;
        }

        tx.commit()?;
        Ok(run.run_id.clone())
    }

    /// 保存任务状态, 以及本次被启动的批次 (单事务)
    ///
    /// 被启动的批次只写状态与启动时间, 其余字段由批次命令各自保存
    pub fn save_lifecycle(&self, run: &Run, started_batch: Option<&Batch>) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE production_run SET status = ?1, completed_at = ?2 WHERE run_id = ?3",
            params![
                run.status.to_db_str(),
                run.completed_at.as_ref().map(format_datetime),
                run.run_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Run", &run.run_id));
        }
        if let Some(batch) = started_batch {
            mark_started(&tx, batch)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// 按ID查询任务 (含批次与事件)
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<Run>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                &format!("{} WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id],
                map_run_row,
            )
            .optional()?;

        match run {
            Some(run) => Ok(Some(Self::hydrate(&conn, run)?)),
            None => Ok(None),
        }
    }

    /// 查询所有任务 (按创建时间倒序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Run>> {
        let conn = self.get_conn()?;
        let runs = {
            let mut stmt = conn.prepare(&format!("{} ORDER BY created_at DESC", RUN_COLUMNS))?;
            let rows = stmt
                .query_map([], map_run_row)?
                .collect::<SqliteResult<Vec<_>>>()?;
            rows
        };

        runs.into_iter()
            .map(|run| Self::hydrate(&conn, run))
            .collect()
    }

    fn hydrate(conn: &Connection, mut run: Run) -> RepositoryResult<Run> {
        run.batches = load_batches_by_run(conn, &run.run_id)?;
        run.events = load_events_by_run(conn, &run.run_id)?;
        Ok(run)
    }
}

fn map_run_row(row: &Row) -> SqliteResult<Run> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;

    Ok(Run {
        run_id: row.get(0)?,
        recipe_id: row.get(1)?,
        target_total_weight: row.get(2)?,
        batch_size: row.get(3)?,
        status: RunStatus::from_db_str(&status)
            .ok_or_else(|| invalid_column(4, format!("未知任务状态: {}", status)))?,
        batches: Vec::new(),
        events: Vec::new(),
        created_by: row.get(5)?,
        created_at: parse_datetime(6, &created_at)?,
        completed_at: parse_optional_datetime(7, completed_at)?,
    })
}

// ==========================================
// 配料批次执行系统 - 批次数据仓储
// ==========================================
// 批次行 + 投料台账 (consumption_entry)
// 保存语义: 批次行整体更新, 台账按 entry_id 追加, 已存在记录只同步作废标记
// 红线: 台账不做物理删除
// ==========================================

use crate::db::{format_datetime, invalid_column, parse_datetime, parse_optional_datetime};
use crate::domain::batch::{Batch, ConfirmationStatus};
use crate::domain::consumption::{ConsumptionEntry, ConsumptionLedger};
use crate::domain::types::{BatchStatus, ConsumptionKind, NirsStatus, SamplingStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const BATCH_COLUMNS: &str = r#"
    SELECT batch_id, run_id, batch_number, target_weight, status,
           nirs_status, sampling_status, nirs_sequence, weighing_finished_json,
           started_at, completed_at
    FROM batch
"#;

// ==========================================
// BatchRepository - 批次仓储
// ==========================================
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按ID查询批次 (含台账)
    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<Batch>> {
        let conn = self.get_conn()?;
        load_batch(&conn, batch_id)
    }

    /// 查询任务下全部批次 (按批次号排序)
    pub fn find_by_run(&self, run_id: &str) -> RepositoryResult<Vec<Batch>> {
        let conn = self.get_conn()?;
        load_batches_by_run(&conn, run_id)
    }

    /// 汇总来源批号在全部批次台账中的有效领用量 (不含已作废记录)
    pub fn drawn_from_source(&self, source_reference: &str) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let drawn = conn.query_row(
            r#"SELECT COALESCE(SUM(quantity), 0.0)
               FROM consumption_entry
               WHERE source_reference = ?1 AND is_annulled = 0"#,
            params![source_reference],
            |row| row.get::<_, f64>(0),
        )?;
        Ok(drawn)
    }

    /// 查询批次所属任务的配方ID
    pub fn find_recipe_id(&self, batch_id: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let recipe_id = conn
            .query_row(
                r#"SELECT r.recipe_id
                   FROM batch b JOIN production_run r ON r.run_id = b.run_id
                   WHERE b.batch_id = ?1"#,
                params![batch_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(recipe_id)
    }

    /// 保存批次 (单事务)
    pub fn save(&self, batch: &Batch) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        write_batch(&tx, batch)?;
        tx.commit()?;
        Ok(())
    }
}

// ==========================================
// 连接级辅助函数 (供其他仓储在同一事务内复用)
// ==========================================

/// 写入批次行与台账
pub(crate) fn write_batch(conn: &Connection, batch: &Batch) -> RepositoryResult<()> {
    let finished: Vec<&String> = batch.weighing_finished.iter().collect();
    conn.execute(
        r#"INSERT INTO batch (
            batch_id, run_id, batch_number, target_weight, status,
            nirs_status, sampling_status, nirs_sequence, weighing_finished_json,
            started_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(batch_id) DO UPDATE SET
            status = excluded.status,
            nirs_status = excluded.nirs_status,
            sampling_status = excluded.sampling_status,
            nirs_sequence = excluded.nirs_sequence,
            weighing_finished_json = excluded.weighing_finished_json,
            started_at = excluded.started_at,
            completed_at = excluded.completed_at"#,
        params![
            batch.batch_id,
            batch.run_id,
            batch.batch_number,
            batch.target_weight,
            batch.status.to_db_str(),
            batch.confirmation.nirs.to_db_str(),
            batch.confirmation.sampling.to_db_str(),
            batch.confirmation.nirs_sequence,
            serde_json::to_string(&finished)?,
            batch.started_at.as_ref().map(format_datetime),
            batch.completed_at.as_ref().map(format_datetime),
        ],
    )?;

    for entry in batch.ledger.entries() {
        write_entry(conn, entry)?;
    }
    Ok(())
}

/// 启动批次: 只改写状态与启动时间
///
/// 质量字段、签核与台账由批次命令在批次锁内维护, 此处不覆盖
pub(crate) fn mark_started(conn: &Connection, batch: &Batch) -> RepositoryResult<()> {
    let rows = conn.execute(
        r#"UPDATE batch SET status = ?1, started_at = ?2
           WHERE batch_id = ?3 AND status = ?4"#,
        params![
            batch.status.to_db_str(),
            batch.started_at.as_ref().map(format_datetime),
            batch.batch_id,
            BatchStatus::Planned.to_db_str(),
        ],
    )?;
    if rows == 0 {
        return Err(RepositoryError::ValidationError(format!(
            "批次 {} 不存在或已不在计划状态",
            batch.batch_id
        )));
    }
    Ok(())
}

/// 追加投料记录; 已存在时只同步作废标记
pub(crate) fn write_entry(conn: &Connection, entry: &ConsumptionEntry) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO consumption_entry (
            entry_id, batch_id, ingredient_name, source_reference, quantity,
            kind, adjustment_id, is_annulled, recorded_at, recorded_by
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(entry_id) DO UPDATE SET is_annulled = excluded.is_annulled"#,
        params![
            entry.entry_id,
            entry.batch_id,
            entry.ingredient_name,
            entry.source_reference,
            entry.quantity,
            entry.kind.to_db_str(),
            entry.adjustment_id,
            entry.is_annulled,
            format_datetime(&entry.recorded_at),
            entry.recorded_by,
        ],
    )?;
    Ok(())
}

pub(crate) fn load_batch(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<Batch>> {
    let batch = conn
        .query_row(
            &format!("{} WHERE batch_id = ?1", BATCH_COLUMNS),
            params![batch_id],
            map_batch_row,
        )
        .optional()?;

    match batch {
        Some(mut batch) => {
            batch.ledger = load_ledger(conn, &batch.batch_id)?;
            Ok(Some(batch))
        }
        None => Ok(None),
    }
}

pub(crate) fn load_batches_by_run(conn: &Connection, run_id: &str) -> RepositoryResult<Vec<Batch>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE run_id = ?1 ORDER BY batch_number ASC",
        BATCH_COLUMNS
    ))?;
    let mut batches = stmt
        .query_map(params![run_id], map_batch_row)?
        .collect::<SqliteResult<Vec<_>>>()?;

    for batch in &mut batches {
        batch.ledger = load_ledger(conn, &batch.batch_id)?;
    }
    Ok(batches)
}

fn load_ledger(conn: &Connection, batch_id: &str) -> RepositoryResult<ConsumptionLedger> {
    let mut stmt = conn.prepare(
        r#"SELECT entry_id, batch_id, ingredient_name, source_reference, quantity,
                  kind, adjustment_id, is_annulled, recorded_at, recorded_by
           FROM consumption_entry
           WHERE batch_id = ?1
           ORDER BY rowid ASC"#,
    )?;
    let entries = stmt
        .query_map(params![batch_id], map_entry_row)?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(ConsumptionLedger::from_entries(entries))
}

fn map_batch_row(row: &Row) -> SqliteResult<Batch> {
    let status: String = row.get(4)?;
    let nirs: String = row.get(5)?;
    let sampling: String = row.get(6)?;
    let finished_json: String = row.get(8)?;
    let started_at: Option<String> = row.get(9)?;
    let completed_at: Option<String> = row.get(10)?;

    let weighing_finished: BTreeSet<String> = serde_json::from_str(&finished_json)
        .map_err(|e| invalid_column(8, format!("weighing_finished_json: {}", e)))?;

    Ok(Batch {
        batch_id: row.get(0)?,
        run_id: row.get(1)?,
        batch_number: row.get(2)?,
        target_weight: row.get(3)?,
        status: BatchStatus::from_db_str(&status)
            .ok_or_else(|| invalid_column(4, format!("未知批次状态: {}", status)))?,
        confirmation: ConfirmationStatus {
            nirs: NirsStatus::from_db_str(&nirs)
                .ok_or_else(|| invalid_column(5, format!("未知 NIRS 状态: {}", nirs)))?,
            sampling: SamplingStatus::from_db_str(&sampling)
                .ok_or_else(|| invalid_column(6, format!("未知取样状态: {}", sampling)))?,
            nirs_sequence: row.get(7)?,
        },
        weighing_finished,
        ledger: ConsumptionLedger::new(),
        started_at: parse_optional_datetime(9, started_at)?,
        completed_at: parse_optional_datetime(10, completed_at)?,
    })
}

fn map_entry_row(row: &Row) -> SqliteResult<ConsumptionEntry> {
    let kind: String = row.get(5)?;
    let recorded_at: String = row.get(8)?;

    Ok(ConsumptionEntry {
        entry_id: row.get(0)?,
        batch_id: row.get(1)?,
        ingredient_name: row.get(2)?,
        source_reference: row.get(3)?,
        quantity: row.get(4)?,
        kind: ConsumptionKind::from_db_str(&kind)
            .ok_or_else(|| invalid_column(5, format!("未知投料类型: {}", kind)))?,
        adjustment_id: row.get(6)?,
        is_annulled: row.get(7)?,
        recorded_at: parse_datetime(8, &recorded_at)?,
        recorded_by: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recipe::{Recipe, RecipeIngredient};
    use crate::engine::run_lifecycle::RunLifecycleManager;
    use crate::repository::recipe_repo::RecipeRepository;
    use crate::repository::run_repo::RunRepository;

    fn setup() -> (Arc<Mutex<Connection>>, Batch) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        RecipeRepository::new(conn.clone())
            .insert(&Recipe::new("R1", "r", vec![RecipeIngredient::new("A", 1.0)]))
            .unwrap();
        let run = RunLifecycleManager::new()
            .initialize("R1", 500.0, 500.0, "op")
            .unwrap();
        RunRepository::new(conn.clone()).insert(&run).unwrap();

        let batch = run.batches[0].clone();
        (conn, batch)
    }

    #[test]
    fn test_save_appends_entries_and_syncs_annulment() {
        let (conn, mut batch) = setup();
        let repo = BatchRepository::new(conn);

        batch.status = BatchStatus::Ongoing;
        batch.started_at = Some(chrono::Utc::now().naive_utc());
        let first = ConsumptionEntry::new(&batch.batch_id, "A", "P-01", 120.0, ConsumptionKind::Manual, "op");
        let second = ConsumptionEntry::new(&batch.batch_id, "A", "P-02", -20.0, ConsumptionKind::Manual, "op");
        batch.ledger.append(first.clone());
        batch.ledger.append(second.clone());
        batch.weighing_finished.insert("A".to_string());
        batch.confirmation.nirs = NirsStatus::Nok;
        batch.confirmation.nirs_sequence = 1;
        repo.save(&batch).unwrap();

        let loaded = repo.find_by_id(&batch.batch_id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Ongoing);
        assert_eq!(loaded.ledger.len(), 2);
        assert_eq!(loaded.ledger.entries()[0].entry_id, first.entry_id);
        assert_eq!(loaded.ledger.effective_quantity("A"), 100.0);
        assert!(loaded.is_weighing_finished("A"));
        assert_eq!(loaded.confirmation.nirs, NirsStatus::Nok);
        assert_eq!(loaded.confirmation.nirs_sequence, 1);

        batch.ledger.annul(&second.entry_id);
        repo.save(&batch).unwrap();
        let loaded = repo.find_by_id(&batch.batch_id).unwrap().unwrap();
        assert_eq!(loaded.ledger.len(), 2);
        assert_eq!(loaded.ledger.effective_quantity("A"), 120.0);
    }

    #[test]
    fn test_drawn_from_source_skips_annulled_entries() {
        let (conn, mut batch) = setup();
        let repo = BatchRepository::new(conn);
        assert_eq!(repo.drawn_from_source("P-01").unwrap(), 0.0);

        batch.status = BatchStatus::Ongoing;
        let kept = ConsumptionEntry::new(&batch.batch_id, "A", "P-01", 80.0, ConsumptionKind::Manual, "op");
        let correction = ConsumptionEntry::new(&batch.batch_id, "A", "P-01", -5.0, ConsumptionKind::Manual, "op");
        let annulled = ConsumptionEntry::new(&batch.batch_id, "A", "P-01", 40.0, ConsumptionKind::Manual, "op");
        let other = ConsumptionEntry::new(&batch.batch_id, "A", "P-02", 30.0, ConsumptionKind::Manual, "op");
        for entry in [&kept, &correction, &annulled, &other] {
            batch.ledger.append(entry.clone());
        }
        batch.ledger.annul(&annulled.entry_id);
        repo.save(&batch).unwrap();

        assert_eq!(repo.drawn_from_source("P-01").unwrap(), 75.0);
        assert_eq!(repo.drawn_from_source("P-02").unwrap(), 30.0);
    }

    #[test]
    fn test_find_recipe_id_and_missing_batch() {
        let (conn, batch) = setup();
        let repo = BatchRepository::new(conn);
        assert_eq!(
            repo.find_recipe_id(&batch.batch_id).unwrap().as_deref(),
            Some("R1")
        );
        assert!(repo.find_by_id("missing").unwrap().is_none());
        assert_eq!(repo.find_by_run(&batch.run_id).unwrap().len(), 1);
    }
}

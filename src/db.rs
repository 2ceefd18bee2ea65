// ==========================================
// 配料批次执行系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键/busy_timeout)
// - 统一建表 (幂等) 与时间字段格式
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间字段存储格式 (UTC)
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表 (幂等)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![CURRENT_SCHEMA_VERSION, format_datetime(&chrono::Utc::now().naive_utc())],
    )?;
    Ok(())
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

/// 解析时间字段; 失败时转换为 rusqlite 列类型错误
pub fn parse_datetime(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 解析可空时间字段
pub fn parse_optional_datetime(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_datetime(idx, &s)).transpose()
}

/// 列值非法 (枚举字符串无法识别等)
pub fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL DEFAULT 'global',
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT,
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS recipe (
    recipe_id    TEXT PRIMARY KEY,
    recipe_name  TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recipe_ingredient (
    recipe_id          TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
    seq_no             INTEGER NOT NULL,
    ingredient_name    TEXT NOT NULL,
    unscaled_quantity  REAL NOT NULL,
    PRIMARY KEY (recipe_id, seq_no),
    UNIQUE (recipe_id, ingredient_name)
);

CREATE TABLE IF NOT EXISTS source_material (
    source_reference    TEXT PRIMARY KEY,
    material_name       TEXT NOT NULL,
    available_quantity  REAL NOT NULL,
    blocked             INTEGER NOT NULL DEFAULT 0,
    location            TEXT
);

CREATE TABLE IF NOT EXISTS production_run (
    run_id               TEXT PRIMARY KEY,
    recipe_id            TEXT NOT NULL REFERENCES recipe(recipe_id),
    target_total_weight  REAL NOT NULL,
    batch_size           REAL NOT NULL,
    status               TEXT NOT NULL,
    created_by           TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    completed_at         TEXT
);

CREATE TABLE IF NOT EXISTS batch (
    batch_id                 TEXT PRIMARY KEY,
    run_id                   TEXT NOT NULL REFERENCES production_run(run_id) ON DELETE CASCADE,
    batch_number             INTEGER NOT NULL,
    target_weight            REAL NOT NULL,
    status                   TEXT NOT NULL,
    nirs_status              TEXT NOT NULL DEFAULT 'pending',
    sampling_status          TEXT NOT NULL DEFAULT 'pending',
    nirs_sequence            INTEGER NOT NULL DEFAULT 0,
    weighing_finished_json   TEXT NOT NULL DEFAULT '[]',
    started_at               TEXT,
    completed_at             TEXT,
    UNIQUE (run_id, batch_number)
);

CREATE INDEX IF NOT EXISTS idx_batch_run ON batch(run_id);

CREATE TABLE IF NOT EXISTS consumption_entry (
    entry_id          TEXT PRIMARY KEY,
    batch_id          TEXT NOT NULL REFERENCES batch(batch_id) ON DELETE CASCADE,
    ingredient_name   TEXT NOT NULL,
    source_reference  TEXT NOT NULL,
    quantity          REAL NOT NULL,
    kind              TEXT NOT NULL,
    adjustment_id     TEXT,
    is_annulled       INTEGER NOT NULL DEFAULT 0,
    recorded_at       TEXT NOT NULL,
    recorded_by       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_consumption_batch ON consumption_entry(batch_id);

CREATE TABLE IF NOT EXISTS adjustment_order (
    adjustment_id     TEXT PRIMARY KEY,
    batch_id          TEXT NOT NULL REFERENCES batch(batch_id) ON DELETE CASCADE,
    status            TEXT NOT NULL,
    materials_json    TEXT NOT NULL,
    staging_location  TEXT,
    nirs_sequence     INTEGER NOT NULL,
    created_by        TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    completed_at      TEXT
);

CREATE INDEX IF NOT EXISTS idx_adjustment_batch ON adjustment_order(batch_id);

CREATE TABLE IF NOT EXISTS production_event (
    event_id     TEXT PRIMARY KEY,
    run_id       TEXT NOT NULL REFERENCES production_run(run_id) ON DELETE CASCADE,
    event_type   TEXT NOT NULL,
    description  TEXT NOT NULL,
    occurred_at  TEXT NOT NULL,
    author       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_run ON production_event(run_id);

CREATE TABLE IF NOT EXISTS action_log (
    action_id     TEXT PRIMARY KEY,
    run_id        TEXT,
    batch_id      TEXT,
    action_type   TEXT NOT NULL,
    action_ts     TEXT NOT NULL,
    actor         TEXT NOT NULL,
    payload_json  TEXT,
    detail        TEXT
);

CREATE INDEX IF NOT EXISTS idx_action_log_batch ON action_log(batch_id);
CREATE INDEX IF NOT EXISTS idx_action_log_run ON action_log(run_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_datetime_round_trip_keeps_millis() {
        let raw = "2026-03-01 08:15:30.125";
        let dt = parse_datetime(0, raw).unwrap();
        assert_eq!(format_datetime(&dt), raw);
        assert!(parse_datetime(0, "not a date").is_err());
    }
}

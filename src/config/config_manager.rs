// ==========================================
// 配料批次执行系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::execution_config::{sanitize_ratio, ExecutionConfig};
use crate::db::{format_datetime, open_sqlite_connection};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, format_datetime(&chrono::Utc::now().naive_utc())],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置
    pub fn get_all_global(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 加载批次执行参数
    pub fn load_execution_config(&self) -> Result<ExecutionConfig, Box<dyn Error>> {
        let defaults = ExecutionConfig::default();

        let consumption = self.get_config_value(config_keys::CONSUMPTION_TOLERANCE_RATIO)?;
        let pick = self.get_config_value(config_keys::PICK_TOLERANCE_RATIO)?;
        let latency = self.get_config_value(config_keys::AUTO_WEIGH_LATENCY_MS)?;
        let source_ref = self.get_config_value(config_keys::AUTO_WEIGH_SOURCE_REFERENCE)?;

        Ok(ExecutionConfig {
            consumption_tolerance_ratio: sanitize_ratio(
                config_keys::CONSUMPTION_TOLERANCE_RATIO,
                consumption.as_deref(),
                defaults.consumption_tolerance_ratio,
            ),
            pick_tolerance_ratio: sanitize_ratio(
                config_keys::PICK_TOLERANCE_RATIO,
                pick.as_deref(),
                defaults.pick_tolerance_ratio,
            ),
            auto_weigh_latency_ms: latency
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(defaults.auto_weigh_latency_ms),
            auto_weigh_source_reference: source_ref
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.auto_weigh_source_reference),
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 容差
    pub const CONSUMPTION_TOLERANCE_RATIO: &str = "consumption_tolerance_ratio";
    pub const PICK_TOLERANCE_RATIO: &str = "pick_tolerance_ratio";

    // 自动称重
    pub const AUTO_WEIGH_LATENCY_MS: &str = "auto_weigh_latency_ms";
    pub const AUTO_WEIGH_SOURCE_REFERENCE: &str = "auto_weigh_source_reference";
}

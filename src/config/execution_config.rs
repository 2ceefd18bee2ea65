// ==========================================
// 配料批次执行系统 - 执行参数
// ==========================================
// 来源: config_kv (scope_id='global'), 缺省值见 Default
// ==========================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 批次执行参数快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// 配料投料完成容差 (需求量比例)
    pub consumption_tolerance_ratio: f64,
    /// 纠偏物料备料完成容差
    pub pick_tolerance_ratio: f64,
    /// 模拟秤单次称重耗时
    pub auto_weigh_latency_ms: u64,
    /// 模拟秤记账使用的来源批号
    pub auto_weigh_source_reference: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            consumption_tolerance_ratio: 0.999,
            pick_tolerance_ratio: 0.999,
            auto_weigh_latency_ms: 2_000,
            auto_weigh_source_reference: "AUTO-SCALE".to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn auto_weigh_latency(&self) -> Duration {
        Duration::from_millis(self.auto_weigh_latency_ms)
    }
}

/// 比例必须落在 (0, 1]; 否则回退默认值
pub(crate) fn sanitize_ratio(key: &str, raw: Option<&str>, default: f64) -> f64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v > 0.0 && v <= 1.0 => v,
        _ => {
            tracing::warn!(
                config_key = key,
                raw_value = %raw,
                default,
                "比例配置非法，使用默认值"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_ratio() {
        assert_eq!(sanitize_ratio("k", None, 0.999), 0.999);
        assert_eq!(sanitize_ratio("k", Some("0.98"), 0.999), 0.98);
        assert_eq!(sanitize_ratio("k", Some("1"), 0.999), 1.0);
        assert_eq!(sanitize_ratio("k", Some("1.5"), 0.999), 0.999);
        assert_eq!(sanitize_ratio("k", Some("0"), 0.999), 0.999);
        assert_eq!(sanitize_ratio("k", Some("abc"), 0.999), 0.999);
    }
}

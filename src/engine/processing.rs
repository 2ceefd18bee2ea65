// ==========================================
// 配料批次执行系统 - 互斥标记
// ==========================================
// ProcessingMarkers: (batch_id, ingredient) 级"处理中"标记
//   自动称重与人工投料必须先持有标记才能写台账
//   Guard 析构时无条件释放 (成功或失败)
// KeyedLocks: 按批次ID串行化写命令
// ==========================================

use crate::engine::error::{ExecutionError, ExecutionResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type MarkerKey = (String, String);

// ==========================================
// ProcessingMarkers - 配料处理中标记
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ProcessingMarkers {
    held: Arc<Mutex<HashSet<MarkerKey>>>,
}

impl ProcessingMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取标记; 已被占用返回 IngredientBusy
    pub fn try_acquire(&self, batch_id: &str, ingredient_name: &str) -> ExecutionResult<ProcessingGuard> {
        let key = (batch_id.to_string(), ingredient_name.to_string());
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.clone()) {
            return Err(ExecutionError::IngredientBusy {
                batch_id: key.0,
                ingredient_name: key.1,
            });
        }
        Ok(ProcessingGuard {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_processing(&self, batch_id: &str, ingredient_name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(batch_id.to_string(), ingredient_name.to_string()))
    }
}

/// 持有期间该配料处于"处理中"
#[derive(Debug)]
pub struct ProcessingGuard {
    held: Arc<Mutex<HashSet<MarkerKey>>>,
    key: MarkerKey,
}

impl ProcessingGuard {
    pub fn batch_id(&self) -> &str {
        &self.key.0
    }

    pub fn ingredient_name(&self) -> &str {
        &self.key.1
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

// ==========================================
// KeyedLocks - 按键串行化
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某键对应的锁对象 (调用方自行 lock)
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// 锁定; 中毒的锁直接恢复 (保护对象为空元组)
    pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

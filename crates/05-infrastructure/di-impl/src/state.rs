//! 状态存储实现

use dashmap::DashMap;
use di_abstractions::{StateSnapshot, StateStore};
use infrastructure_common::{ConfigError, ConfigResult, ConfigSection, ContextValue};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// 基于 `DashMap` 的状态存储
#[derive(Debug, Default)]
pub struct StateStoreImpl {
    entries: DashMap<String, ContextValue>,
}

impl StateStoreImpl {
    /// 创建空的状态存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置节创建状态存储
    pub fn from_config(config: &ConfigSection) -> Self {
        let store = Self::new();
        store.seed(config);
        store
    }

    /// 写入配置节中的全部键
    pub fn seed(&self, config: &ConfigSection) {
        for (key, value) in &config.data {
            self.entries
                .insert(key.clone(), ContextValue::Data(value.clone()));
        }
        debug!(entries = config.len(), "状态存储已写入初始配置");
    }

    /// 读取并反序列化，键不存在时返回 `None`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> ConfigResult<Option<T>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let data = value
            .into_data()
            .ok_or_else(|| ConfigError::TypeConversionError {
                message: format!("状态键 {key} 保存的是共享对象"),
            })?;
        Ok(Some(serde_json::from_value(data)?))
    }

    /// 清空
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl StateStore for StateStoreImpl {
    fn get(&self, key: &str) -> Option<ContextValue> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: ContextValue) {
        self.entries.insert(key.to_string(), value);
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn remove(&self, key: &str) -> Option<ContextValue> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn snapshot(&self) -> StateSnapshot {
        let entries: HashMap<String, ContextValue> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        StateSnapshot::new(entries)
    }

    fn restore(&self, snapshot: &StateSnapshot) {
        self.entries.clear();
        for (key, value) in &snapshot.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        debug!(entries = snapshot.len(), "状态存储已恢复到快照");
    }
}

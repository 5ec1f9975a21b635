//! 初始配置

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 配置节
///
/// 扁平的字符串键配置，容器构建时用它预置状态存储
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSection {
    /// 配置数据
    pub data: HashMap<String, Value>,
}

impl ConfigSection {
    /// 创建新的配置节
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// 插入配置项
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// 链式插入配置项
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// 获取配置项
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 获取必需的配置项
    pub fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.data.get(key).ok_or_else(|| ConfigError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// 配置项数量
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 绑定到具体类型
    pub fn bind<T>(&self) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        serde_json::from_value(value).map_err(|e| ConfigError::SerializationError { source: e })
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigSection
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            data: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

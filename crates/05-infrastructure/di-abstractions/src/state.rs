//! 状态存储抽象接口

use chrono::{DateTime, Utc};
use infrastructure_common::ContextValue;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// 保留给环境值的键前缀，例如 `@event`
pub const AMBIENT_KEY_PREFIX: char = '@';

/// 键是否为保留的环境键
pub fn is_ambient_key(key: &str) -> bool {
    key.starts_with(AMBIENT_KEY_PREFIX)
}

/// 规范化环境键，缺少前缀时补上 `@`
pub fn ambient_key(key: &str) -> Cow<'_, str> {
    if is_ambient_key(key) {
        Cow::Borrowed(key)
    } else {
        Cow::Owned(format!("{AMBIENT_KEY_PREFIX}{key}"))
    }
}

/// 状态存储 trait
///
/// 字符串键到任意值的可变映射，写入立即可见，后写入者胜出
pub trait StateStore: Send + Sync + fmt::Debug {
    /// 读取
    fn get(&self, key: &str) -> Option<ContextValue>;

    /// 写入
    fn set(&self, key: &str, value: ContextValue);

    /// 是否存在
    fn has(&self, key: &str) -> bool;

    /// 删除，返回旧值
    fn remove(&self, key: &str) -> Option<ContextValue>;

    /// 全部键，按字典序
    fn keys(&self) -> Vec<String>;

    /// 条目数量
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 保存完整快照
    fn snapshot(&self) -> StateSnapshot;

    /// 恢复到快照，快照之后新增的键会被删除
    fn restore(&self, snapshot: &StateSnapshot);
}

/// 状态快照
#[derive(Clone)]
pub struct StateSnapshot {
    /// 快照内容
    pub entries: HashMap<String, ContextValue>,
    /// 快照时间
    pub taken_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// 创建快照
    pub fn new(entries: HashMap<String, ContextValue>) -> Self {
        Self {
            entries,
            taken_at: Utc::now(),
        }
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("StateSnapshot")
            .field("keys", &keys)
            .field("taken_at", &self.taken_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_keys() {
        assert!(is_ambient_key("@event"));
        assert!(!is_ambient_key("event"));
        assert_eq!(ambient_key("@event"), "@event");
        assert_eq!(ambient_key("event"), "@event");
    }
}

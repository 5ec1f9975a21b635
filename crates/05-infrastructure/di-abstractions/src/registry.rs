//! 元数据注册表抽象接口
//!
//! 元数据以 (元数据键, 声明位置) 寻址。同一位置上同一键的多次定义会合并，
//! 不同位置上的定义按定义顺序累积。

use infrastructure_common::{Declaration, TypeInfo};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// 元数据记录
///
/// 每个元数据键固定一种记录类型
pub trait MetadataRecord: Clone + Send + Sync + fmt::Debug + 'static {
    /// 合并同一声明位置上后定义的记录，按字段后写入者胜出
    fn merge(&mut self, other: Self);
}

/// JSON 记录：两边都是对象时按顶层字段浅合并，否则整体替换
impl MetadataRecord for Value {
    fn merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(current), Value::Object(incoming)) => {
                for (field, value) in incoming {
                    current.insert(field, value);
                }
            }
            (current, incoming) => *current = incoming,
        }
    }
}

/// 类型化的元数据键
///
/// 名称相同但记录类型不同的键互不冲突
pub struct MetadataKey<V> {
    name: &'static str,
    _record: PhantomData<fn() -> V>,
}

impl<V> MetadataKey<V> {
    /// 创建元数据键
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _record: PhantomData,
        }
    }

    /// 键名称
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for MetadataKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for MetadataKey<V> {}

impl<V> fmt::Debug for MetadataKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataKey")
            .field("name", &self.name)
            .field("record", &std::any::type_name::<V>())
            .finish()
    }
}

impl<V> fmt::Display for MetadataKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 元数据注册表 trait
///
/// 纯追加，没有删除接口。封存后拒绝新的定义。
pub trait MetadataRegistry: Send + Sync {
    /// 定义元数据，返回定义是否被接受
    fn define<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        declaration: Declaration,
        value: V,
    ) -> bool;

    /// 精确查找
    fn lookup<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        declaration: &Declaration,
    ) -> Option<V>;

    /// 枚举指定类型上某个键的全部记录，按定义顺序
    fn enumerate<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        owner: &TypeInfo,
    ) -> Vec<(Declaration, V)>;

    /// 枚举某个方法的参数级记录，按定义顺序
    fn enumerate_parameters<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        owner: &TypeInfo,
        method: &str,
    ) -> Vec<(Declaration, V)> {
        self.enumerate(key, owner)
            .into_iter()
            .filter(|(declaration, _)| {
                declaration.is_parameter() && declaration.belongs_to_method(method)
            })
            .collect()
    }

    /// 封存注册表
    fn seal(&self);

    /// 是否已封存
    fn is_sealed(&self) -> bool;

    /// 记录总数
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

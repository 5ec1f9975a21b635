//! 元数据注册表实现

use di_abstractions::{MetadataKey, MetadataRecord, MetadataRegistry};
use infrastructure_common::{Declaration, TypeInfo};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// 进程级元数据注册表
static GLOBAL_METADATA: Lazy<Arc<MetadataRegistryImpl>> =
    Lazy::new(|| Arc::new(MetadataRegistryImpl::new()));

/// 获取进程级元数据注册表
pub fn global_metadata() -> Arc<MetadataRegistryImpl> {
    GLOBAL_METADATA.clone()
}

type EntryKey = (&'static str, TypeId, Declaration);

struct MetadataEntry {
    key: &'static str,
    record_type: TypeId,
    declaration: Declaration,
    value: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Entries {
    ordered: Vec<MetadataEntry>,
    index: HashMap<EntryKey, usize>,
}

/// 元数据注册表实现
#[derive(Default)]
pub struct MetadataRegistryImpl {
    entries: RwLock<Entries>,
    sealed: AtomicBool,
}

impl MetadataRegistryImpl {
    /// 创建独立的注册表
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataRegistry for MetadataRegistryImpl {
    fn define<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        declaration: Declaration,
        value: V,
    ) -> bool {
        if self.is_sealed() {
            warn!(key = key.name(), %declaration, "元数据注册表已封存，忽略定义");
            return false;
        }

        let mut entries = self.entries.write();
        let entry_key = (key.name(), TypeId::of::<V>(), declaration);
        if let Some(&position) = entries.index.get(&entry_key) {
            if let Some(existing) = entries.ordered[position].value.downcast_mut::<V>() {
                existing.merge(value);
            }
            debug!(key = key.name(), declaration = %entry_key.2, "合并元数据");
            return true;
        }

        debug!(key = key.name(), declaration = %entry_key.2, "定义元数据");
        let position = entries.ordered.len();
        entries.ordered.push(MetadataEntry {
            key: key.name(),
            record_type: TypeId::of::<V>(),
            declaration: entry_key.2.clone(),
            value: Box::new(value),
        });
        entries.index.insert(entry_key, position);
        true
    }

    fn lookup<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        declaration: &Declaration,
    ) -> Option<V> {
        let entries = self.entries.read();
        let position = *entries
            .index
            .get(&(key.name(), TypeId::of::<V>(), declaration.clone()))?;
        entries.ordered[position].value.downcast_ref::<V>().cloned()
    }

    fn enumerate<V: MetadataRecord>(
        &self,
        key: &MetadataKey<V>,
        owner: &TypeInfo,
    ) -> Vec<(Declaration, V)> {
        let record_type = TypeId::of::<V>();
        self.entries
            .read()
            .ordered
            .iter()
            .filter(|entry| {
                entry.key == key.name()
                    && entry.record_type == record_type
                    && entry.declaration.owner.id == owner.id
            })
            .filter_map(|entry| {
                entry
                    .value
                    .downcast_ref::<V>()
                    .map(|value| (entry.declaration.clone(), value.clone()))
            })
            .collect()
    }

    fn seal(&self) {
        if !self.sealed.swap(true, Ordering::SeqCst) {
            debug!(entries = self.len(), "元数据注册表已封存");
        }
    }

    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.entries.read().ordered.len()
    }
}

impl fmt::Debug for MetadataRegistryImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRegistryImpl")
            .field("entries", &self.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

/// 声明式元数据装饰器
///
/// ```rust
/// use di_abstractions::{MetadataKey, MetadataRegistry};
/// use di_impl::{decorate, MetadataRegistryImpl};
/// use infrastructure_common::Declaration;
/// use serde_json::{json, Value};
///
/// const ROUTE: MetadataKey<Value> = MetadataKey::new("route");
///
/// struct UserController;
///
/// let registry = MetadataRegistryImpl::new();
/// decorate::<UserController>(&registry)
///     .class(&ROUTE, json!({ "prefix": "/users" }))
///     .method("list", &ROUTE, json!({ "verb": "GET" }));
///
/// let route = registry.lookup(&ROUTE, &Declaration::method::<UserController>("list"));
/// assert_eq!(route, Some(json!({ "verb": "GET" })));
/// ```
pub struct Decorator<'r, T: ?Sized> {
    registry: &'r MetadataRegistryImpl,
    _target: PhantomData<fn() -> Box<T>>,
}

/// 为类型 `T` 创建装饰器
pub fn decorate<T: ?Sized + 'static>(registry: &MetadataRegistryImpl) -> Decorator<'_, T> {
    Decorator {
        registry,
        _target: PhantomData,
    }
}

impl<'r, T: ?Sized + 'static> Decorator<'r, T> {
    /// 类级别元数据
    pub fn class<V: MetadataRecord>(self, key: &MetadataKey<V>, value: V) -> Self {
        self.registry.define(key, Declaration::class::<T>(), value);
        self
    }

    /// 方法级别元数据
    pub fn method<V: MetadataRecord>(
        self,
        method: &str,
        key: &MetadataKey<V>,
        value: V,
    ) -> Self {
        self.registry
            .define(key, Declaration::method::<T>(method), value);
        self
    }

    /// 参数级别元数据
    pub fn parameter<V: MetadataRecord>(
        self,
        method: &str,
        index: usize,
        key: &MetadataKey<V>,
        value: V,
    ) -> Self {
        self.registry
            .define(key, Declaration::parameter::<T>(method, index), value);
        self
    }
}

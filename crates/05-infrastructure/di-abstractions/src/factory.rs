//! 组件构建抽象
//!
//! 组件通过实现 [`Injectable`] 显式声明依赖和构建方式，容器据此建立依赖图。

use infrastructure_clock::Clock;
use infrastructure_common::{
    Component, ContextValue, DependencyError, DependencyResult, Lifecycle, TypeInfo,
};
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 已解析的组件实例
pub type ResolvedComponent = Arc<dyn Any + Send + Sync>;

/// 组件工厂
pub type FactoryFn = fn(&dyn Injector) -> DependencyResult<ResolvedComponent>;

/// 从已解析实例中取出生命周期钩子
pub type LifecycleFn = fn(ResolvedComponent) -> Option<Arc<dyn Lifecycle>>;

/// 依赖声明函数
///
/// 延迟求值，循环声明的组件不会在注册时无限递归
pub type DependenciesFn = fn() -> Vec<Dependency>;

/// 可由容器构建的组件
pub trait Injectable: Component + Sized {
    /// 直接依赖
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// 使用已解析的依赖构建实例
    fn inject(injector: &dyn Injector) -> DependencyResult<Self>;

    /// 暴露生命周期钩子
    fn lifecycle(instance: Arc<Self>) -> Option<Arc<dyn Lifecycle>> {
        let _ = instance;
        None
    }
}

/// 组件工厂看到的依赖视图
///
/// 只能取到当前组件声明过的依赖
pub trait Injector: Send + Sync {
    /// 正在构建的组件
    fn component(&self) -> &TypeInfo;

    /// 获取已解析的依赖
    fn resolve(&self, type_info: &TypeInfo) -> DependencyResult<ResolvedComponent>;

    /// 读取状态存储
    fn state(&self, key: &str) -> Option<ContextValue>;

    /// 容器时钟
    fn clock(&self) -> Arc<dyn Clock>;
}

impl<'a> dyn Injector + 'a {
    /// 获取类型化的依赖
    pub fn get<T: Component>(&self) -> DependencyResult<Arc<T>> {
        let type_info = TypeInfo::of::<T>();
        self.resolve(&type_info)?
            .downcast::<T>()
            .map_err(|_| DependencyError::TypeMismatch {
                type_name: type_info.name,
            })
    }

    /// 读取状态存储中的值并反序列化，键不存在时返回 `None`
    pub fn state_as<T: DeserializeOwned>(&self, key: &str) -> DependencyResult<Option<T>> {
        let Some(value) = self.state(key) else {
            return Ok(None);
        };
        let data = value.into_data().ok_or_else(|| {
            DependencyError::creation_failed(
                self.component().name.clone(),
                format!("状态键 {key} 不是结构化数据"),
            )
        })?;
        serde_json::from_value(data)
            .map(Some)
            .map_err(|e| DependencyError::creation_failed(self.component().name.clone(), e))
    }

    /// 读取必需的状态值
    pub fn require_state<T: DeserializeOwned>(&self, key: &str) -> DependencyResult<T> {
        self.state_as(key)?.ok_or_else(|| {
            DependencyError::creation_failed(
                self.component().name.clone(),
                format!("缺少状态键: {key}"),
            )
        })
    }
}

/// 依赖声明
#[derive(Clone, Debug)]
pub enum Dependency {
    /// 由容器构建的组件，未声明时自动合成
    Component(ComponentRegistration),
    /// 必须由外部提供实例的类型
    Provided(TypeInfo),
}

impl Dependency {
    /// 依赖一个可注入组件
    pub fn on<T: Injectable>() -> Self {
        Self::Component(ComponentRegistration::of::<T>())
    }

    /// 依赖一个外部提供的实例
    pub fn provided<T: Component>() -> Self {
        Self::Provided(TypeInfo::of::<T>())
    }

    /// 依赖的类型信息
    pub fn type_info(&self) -> &TypeInfo {
        match self {
            Self::Component(registration) => &registration.type_info,
            Self::Provided(type_info) => type_info,
        }
    }
}

/// 组件注册信息
#[derive(Clone)]
pub struct ComponentRegistration {
    /// 类型信息
    pub type_info: TypeInfo,
    /// 依赖声明
    pub dependencies: DependenciesFn,
    /// 组件工厂
    pub factory: FactoryFn,
    /// 生命周期钩子提取
    pub lifecycle: LifecycleFn,
}

impl ComponentRegistration {
    /// 从可注入类型创建注册信息
    pub fn of<T: Injectable>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            dependencies: T::dependencies,
            factory: create::<T>,
            lifecycle: lifecycle_of::<T>,
        }
    }
}

impl fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("type_info", &self.type_info)
            .finish_non_exhaustive()
    }
}

fn create<T: Injectable>(injector: &dyn Injector) -> DependencyResult<ResolvedComponent> {
    let component = T::inject(injector)?;
    Ok(Arc::new(component))
}

fn lifecycle_of<T: Injectable>(instance: ResolvedComponent) -> Option<Arc<dyn Lifecycle>> {
    instance.downcast::<T>().ok().and_then(T::lifecycle)
}

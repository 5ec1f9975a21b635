//! 组件基础接口定义
//!
//! 提供所有容器托管组件必须实现的基础 trait

use crate::metadata::TypeInfo;
use std::fmt::Debug;

/// 组件基础 trait
///
/// 所有由容器托管的组件都必须实现此 trait
pub trait Component: Send + Sync + Debug + 'static {
    /// 组件名称
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 组件描述符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    /// 组件名称
    pub name: String,
    /// 类型信息
    pub type_info: TypeInfo,
    /// 是否由外部提供实例
    pub provided: bool,
    /// 是否已创建实例
    pub instantiated: bool,
    /// 是否暴露生命周期钩子
    ///
    /// 钩子由实例决定，组件尚未创建实例时总是 `false`
    pub has_lifecycle: bool,
}

impl ComponentDescriptor {
    /// 创建新的组件描述符
    pub fn new(type_info: TypeInfo) -> Self {
        Self {
            name: type_info.name.clone(),
            type_info,
            provided: false,
            instantiated: false,
            has_lifecycle: false,
        }
    }
}

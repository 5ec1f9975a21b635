//! # Dependency Injection Abstractions
//!
//! 元数据、依赖注入与生命周期的抽象层。
//!
//! ## 核心接口
//!
//! - [`MetadataRegistry`] - 以声明位置寻址的元数据注册表
//! - [`Injectable`] - 可由容器构建的组件
//! - [`Injector`] - 组件工厂看到的依赖视图
//! - [`ResolveContext`] - 显式解析栈，用于检测循环依赖
//! - [`StateStore`] - 容器级状态存储
//! - [`DiContainer`] - 依赖注入容器

pub mod container;
pub mod factory;
pub mod registry;
pub mod resolver;
pub mod state;

pub use container::*;
pub use factory::*;
pub use registry::*;
pub use resolver::*;
pub use state::*;

//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn Kernel 运行时容器的公共类型、trait 和错误定义。
//!
//! ## 核心组件
//!
//! - [`Component`] - 组件基础 trait
//! - [`Lifecycle`] - 组件生命周期钩子
//! - [`Declaration`] - 元数据寻址（类型、方法、参数）
//! - [`ContextValue`] - 状态存储与参数解析共用的动态值
//! - [`ConfigSection`] - 初始配置节
//!
//! ## 设计原则
//!
//! - 基于 Rust 类型系统的显式注册，而非运行时反射
//! - 异步优先的生命周期钩子
//! - 错误类型统一使用 `thiserror`

pub mod component;
pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod metadata;
pub mod value;

pub use component::*;
pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
pub use value::*;

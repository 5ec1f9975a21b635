//! # 依赖注入具体实现
//!
//! 提供元数据注册表、状态存储、依赖注入容器和参数解析器的具体实现。
//!
//! ## 基本使用
//!
//! ```rust
//! use di_abstractions::{ContainerBuilder, DiContainer, Injectable, Injector};
//! use di_impl::DiContainerBuilder;
//! use infrastructure_common::{Component, DependencyResult};
//!
//! #[derive(Debug)]
//! struct Greeter;
//!
//! impl Component for Greeter {}
//!
//! impl Injectable for Greeter {
//!     fn inject(_injector: &dyn Injector) -> DependencyResult<Self> {
//!         Ok(Greeter)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let container = DiContainerBuilder::new().declare::<Greeter>().build().unwrap();
//! container.start().await.unwrap();
//! let first = container.get::<Greeter>().unwrap();
//! let second = container.get::<Greeter>().unwrap();
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! # });
//! ```

pub mod arguments;
pub mod builder;
pub mod container;
pub mod logging;
pub mod metadata;
pub mod params;
pub mod state;
pub mod testing;

pub use arguments::*;
pub use builder::*;
pub use container::*;
pub use logging::*;
pub use metadata::*;
pub use params::*;
pub use state::*;
pub use testing::*;

//! # Infrastructure Clock
//!
//! 时间抽象层。所有需要延迟或周期性执行的组件都通过 [`Clock`] 调度，
//! 从而在测试中可以用 [`VirtualClock`] 确定性地驱动时间。
//!
//! ## 实现
//!
//! - [`SystemClock`] - 基于 tokio 定时器的真实时钟
//! - [`VirtualClock`] - 可暂停、可时间旅行的虚拟时钟，未暂停时回退到真实定时器
//!
//! ## 基本使用
//!
//! ```rust
//! use infrastructure_clock::{Clock, TimerKind, VirtualClock};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = VirtualClock::new();
//! clock.pause();
//!
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let counter = ticks.clone();
//! clock
//!     .schedule(
//!         Duration::from_millis(500),
//!         TimerKind::Repeating,
//!         Box::new(move || -> infrastructure_common::HookResult {
//!             counter.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//!
//! clock.travel(Duration::from_millis(1600)).unwrap();
//! assert_eq!(ticks.load(Ordering::SeqCst), 3);
//! ```

pub mod clock;
pub mod error;
pub mod system;
pub mod virtual_clock;

pub use clock::*;
pub use error::*;
pub use system::SystemClock;
pub use virtual_clock::VirtualClock;

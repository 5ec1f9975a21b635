//! 时钟抽象接口

use crate::error::{ClockError, ClockResult};
use chrono::{DateTime, Utc};
use infrastructure_common::HookResult;
use std::fmt;
use std::time::Duration;

/// 定时器回调
///
/// 回调返回错误时由时钟记录，不会中断其他定时器
pub type TimerCallback = Box<dyn FnMut() -> HookResult + Send>;

/// 定时器标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// 定时器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// 只触发一次
    Once,
    /// 周期触发，直到取消
    Repeating,
}

/// 定时器信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// 定时器标识
    pub id: TimerId,
    /// 定时器类型
    pub kind: TimerKind,
    /// 调度时间
    pub scheduled_at: DateTime<Utc>,
    /// 延迟
    pub delay: Duration,
    /// 下一次到期时间
    pub due_at: DateTime<Utc>,
}

/// 时钟 trait
///
/// 容器在构建时选择具体实现，组件只依赖这个接口
pub trait Clock: Send + Sync + fmt::Debug {
    /// 当前时间
    fn now(&self) -> DateTime<Utc>;

    /// 调度定时器
    fn schedule(
        &self,
        delay: Duration,
        kind: TimerKind,
        callback: TimerCallback,
    ) -> ClockResult<Timer>;

    /// 取消定时器，返回定时器是否仍处于待触发状态
    fn cancel(&self, timer: TimerId) -> bool;

    /// 待触发的定时器数量
    fn pending_timers(&self) -> usize;
}

impl<'a> dyn Clock + 'a {
    /// 延迟执行一次
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> ClockResult<Timer>
    where
        F: FnMut() -> HookResult + Send + 'static,
    {
        self.schedule(delay, TimerKind::Once, Box::new(callback))
    }

    /// 周期执行
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> ClockResult<Timer>
    where
        F: FnMut() -> HookResult + Send + 'static,
    {
        self.schedule(period, TimerKind::Repeating, Box::new(callback))
    }
}

/// 周期定时器的最小周期，避免零周期在时间旅行中无限触发
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// 规范化定时器延迟
pub(crate) fn effective_delay(delay: Duration, kind: TimerKind) -> Duration {
    match kind {
        TimerKind::Repeating if delay < MIN_PERIOD => MIN_PERIOD,
        _ => delay,
    }
}

/// 转换为 chrono 时长
pub(crate) fn to_chrono(delay: Duration) -> ClockResult<chrono::Duration> {
    chrono::Duration::from_std(delay).map_err(|_| out_of_range(delay))
}

/// 计算 `at` 之后 `delay` 的时刻，超出可表示的日期范围时返回错误
pub(crate) fn due_after(at: DateTime<Utc>, delay: Duration) -> ClockResult<DateTime<Utc>> {
    at.checked_add_signed(to_chrono(delay)?)
        .ok_or_else(|| out_of_range(delay))
}

fn out_of_range(delay: Duration) -> ClockError {
    ClockError::DelayOutOfRange {
        millis: delay.as_millis(),
    }
}

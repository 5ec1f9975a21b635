//! 虚拟时钟
//!
//! 未暂停时行为与真实时钟一致：定时器由 tokio 驱动，触发前会检查时钟仍未暂停。
//! 暂停后时间冻结在暂停时刻，定时器只被记录，由 [`VirtualClock::travel`] 显式推进时间
//! 并按到期顺序重放回调。

use crate::clock::{due_after, effective_delay, Clock, Timer, TimerCallback, TimerId, TimerKind};
use crate::error::{ClockError, ClockResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

type SharedCallback = Arc<Mutex<TimerCallback>>;

struct TimerEntry {
    timer: Timer,
    callback: SharedCallback,
    /// 是否有真实定时器在驱动
    armed: bool,
}

#[derive(Default)]
struct ClockState {
    frozen_at: Option<DateTime<Utc>>,
    timers: BTreeMap<TimerId, TimerEntry>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ClockState>,
    next_id: AtomicU64,
}

/// 虚拟时钟
///
/// 回调在 `travel` 的调用线程上同步执行，回调内部不能再调用 `travel`。
#[derive(Clone, Default)]
pub struct VirtualClock {
    shared: Arc<Shared>,
}

impl VirtualClock {
    /// 创建未暂停的虚拟时钟
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建冻结在指定时刻的虚拟时钟
    pub fn paused_at(at: DateTime<Utc>) -> Self {
        let clock = Self::new();
        clock.shared.state.lock().frozen_at = Some(at);
        clock
    }

    /// 是否已暂停
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().frozen_at.is_some()
    }

    /// 冻结时间
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if state.frozen_at.is_none() {
            let now = Utc::now();
            state.frozen_at = Some(now);
            info!(cursor = %now, "虚拟时钟已暂停");
        }
    }

    /// 恢复真实时间
    ///
    /// 暂停期间记录的定时器按剩余的虚拟延迟挂到真实定时器上
    pub fn reset(&self) {
        let to_arm = {
            let mut state = self.shared.state.lock();
            let Some(cursor) = state.frozen_at.take() else {
                return;
            };
            info!("虚拟时钟恢复真实时间");

            if Handle::try_current().is_err() {
                if !state.timers.is_empty() {
                    warn!(
                        pending = state.timers.len(),
                        "没有可用的 tokio 运行时，暂停期间的定时器不会被真实时钟驱动"
                    );
                }
                return;
            }

            state
                .timers
                .values_mut()
                .filter(|entry| !entry.armed)
                .map(|entry| {
                    entry.armed = true;
                    let remaining = (entry.timer.due_at - cursor)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    (entry.timer.id, entry.timer.kind, remaining, entry.timer.delay)
                })
                .collect::<Vec<_>>()
        };

        for (id, kind, first_delay, period) in to_arm {
            self.arm(id, kind, first_delay, period);
        }
    }

    /// 时间旅行
    ///
    /// 只能在暂停状态下调用。游标前进 `delta`，所有到期时间不晚于新游标的定时器
    /// 按到期时间升序（相同到期时间按调度顺序）各触发一次；周期定时器触发后立即
    /// 以新的到期时间重新挂起，因此一次较长的旅行可以让它触发多次。
    ///
    /// 某个回调失败不会阻止其余到期回调执行，全部重放完成后返回第一个错误。
    /// 成功时返回触发次数。
    pub fn travel(&self, delta: Duration) -> ClockResult<usize> {
        let target = {
            let state = self.shared.state.lock();
            let cursor = state.frozen_at.ok_or(ClockError::NotPaused)?;
            due_after(cursor, delta)?
        };
        debug!(%target, "开始时间旅行");

        let mut fired = 0;
        let mut first_error: Option<ClockError> = None;

        while let Some((id, callback)) = self.next_due(target) {
            let result = {
                let mut callback = callback.lock();
                (*callback)()
            };
            fired += 1;

            if let Err(source) = result {
                warn!(timer = %id, error = %source, "时间旅行中定时器回调失败");
                if first_error.is_none() {
                    first_error = Some(ClockError::CallbackFailed { timer: id, source });
                }
            }
        }

        {
            let mut state = self.shared.state.lock();
            if let Some(cursor) = state.frozen_at.as_mut() {
                if *cursor < target {
                    *cursor = target;
                }
            }
        }
        debug!(fired, "时间旅行结束");

        match first_error {
            Some(error) => Err(error),
            None => Ok(fired),
        }
    }

    /// 当前记录的定时器
    pub fn timers(&self) -> Vec<Timer> {
        self.shared
            .state
            .lock()
            .timers
            .values()
            .map(|entry| entry.timer.clone())
            .collect()
    }

    /// 取出下一个到期的定时器，并把游标移动到它的到期时间
    fn next_due(&self, target: DateTime<Utc>) -> Option<(TimerId, SharedCallback)> {
        let mut state = self.shared.state.lock();

        let id = state
            .timers
            .values()
            .filter(|entry| entry.timer.due_at <= target)
            .min_by_key(|entry| (entry.timer.due_at, entry.timer.id))
            .map(|entry| entry.timer.id)?;

        let due_at = state.timers.get(&id)?.timer.due_at;
        if let Some(cursor) = state.frozen_at.as_mut() {
            if *cursor < due_at {
                *cursor = due_at;
            }
        }

        let entry = state.timers.get_mut(&id)?;
        let callback = entry.callback.clone();
        let next = match entry.timer.kind {
            TimerKind::Once => None,
            TimerKind::Repeating => due_after(due_at, entry.timer.delay).ok(),
        };
        match next {
            Some(next) => {
                entry.timer.scheduled_at = due_at;
                entry.timer.due_at = next;
            }
            None => {
                if entry.timer.kind == TimerKind::Repeating {
                    warn!(timer = %id, "下一次到期时间超出可表示范围，周期定时器停止");
                }
                state.timers.remove(&id);
            }
        }
        Some((id, callback))
    }

    /// 挂到真实定时器
    fn arm(&self, id: TimerId, kind: TimerKind, first_delay: Duration, period: Duration) {
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drive(
                    Arc::downgrade(&self.shared),
                    id,
                    kind,
                    first_delay,
                    period,
                ));
            }
            Err(_) => {
                warn!(timer = %id, "没有可用的 tokio 运行时，定时器未挂到真实时钟");
                if let Some(entry) = self.shared.state.lock().timers.get_mut(&id) {
                    entry.armed = false;
                }
            }
        }
    }
}

/// 真实定时器触发后的处理结果
enum RealFire {
    Fire(SharedCallback),
    Suppressed,
    Gone,
}

fn take_real_fire(shared: &Shared, id: TimerId) -> RealFire {
    let mut state = shared.state.lock();
    let paused = state.frozen_at.is_some();

    let Some(entry) = state.timers.get_mut(&id) else {
        return RealFire::Gone;
    };
    if paused {
        if entry.timer.kind == TimerKind::Once {
            // 暂停压制了这次触发，恢复时需要重新挂起
            entry.armed = false;
        }
        return RealFire::Suppressed;
    }

    let callback = entry.callback.clone();
    let now = Utc::now();
    let next = match entry.timer.kind {
        TimerKind::Once => None,
        TimerKind::Repeating => due_after(now, entry.timer.delay).ok(),
    };
    match next {
        Some(next) => {
            entry.timer.scheduled_at = now;
            entry.timer.due_at = next;
        }
        None => {
            state.timers.remove(&id);
        }
    }
    RealFire::Fire(callback)
}

async fn drive(
    weak: Weak<Shared>,
    id: TimerId,
    kind: TimerKind,
    first_delay: Duration,
    period: Duration,
) {
    let mut delay = first_delay;
    loop {
        tokio::time::sleep(delay).await;
        delay = period;

        let Some(shared) = weak.upgrade() else {
            return;
        };
        match take_real_fire(&shared, id) {
            RealFire::Gone => return,
            RealFire::Suppressed => {
                debug!(timer = %id, "时钟已暂停，跳过真实定时器触发");
                if kind == TimerKind::Once {
                    return;
                }
            }
            RealFire::Fire(callback) => {
                drop(shared);
                let result = {
                    let mut callback = callback.lock();
                    (*callback)()
                };
                if let Err(error) = result {
                    warn!(timer = %id, %error, "定时器回调失败");
                }
                if kind == TimerKind::Once {
                    return;
                }
            }
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.shared.state.lock().frozen_at.unwrap_or_else(Utc::now)
    }

    fn schedule(
        &self,
        delay: Duration,
        kind: TimerKind,
        callback: TimerCallback,
    ) -> ClockResult<Timer> {
        let delay = effective_delay(delay, kind);

        let (timer, paused) = {
            let mut state = self.shared.state.lock();
            let paused = state.frozen_at.is_some();
            if !paused && Handle::try_current().is_err() {
                return Err(ClockError::NoRuntime);
            }

            let now = state.frozen_at.unwrap_or_else(Utc::now);
            let due_at = due_after(now, delay)?;
            let timer = Timer {
                id: TimerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1),
                kind,
                scheduled_at: now,
                delay,
                due_at,
            };
            state.timers.insert(
                timer.id,
                TimerEntry {
                    timer: timer.clone(),
                    callback: Arc::new(Mutex::new(callback)),
                    armed: !paused,
                },
            );
            (timer, paused)
        };

        debug!(timer = %timer.id, ?kind, ?delay, paused, "调度虚拟定时器");
        if !paused {
            self.arm(timer.id, kind, delay, delay);
        }
        Ok(timer)
    }

    fn cancel(&self, timer: TimerId) -> bool {
        self.shared.state.lock().timers.remove(&timer).is_some()
    }

    fn pending_timers(&self) -> usize {
        self.shared.state.lock().timers.len()
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("VirtualClock")
            .field("frozen_at", &state.frozen_at)
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}

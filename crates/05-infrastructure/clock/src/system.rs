//! 基于 tokio 定时器的真实时钟

use crate::clock::{due_after, effective_delay, Clock, Timer, TimerCallback, TimerId, TimerKind};
use crate::error::{ClockError, ClockResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// 真实时钟
///
/// 定时器由当前 tokio 运行时驱动，调度时必须处于运行时上下文中
#[derive(Debug, Default, Clone)]
pub struct SystemClock {
    shared: Arc<SystemShared>,
}

#[derive(Debug, Default)]
struct SystemShared {
    active: Mutex<HashMap<TimerId, Timer>>,
    next_id: AtomicU64,
}

impl SystemClock {
    /// 创建新的真实时钟
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule(
        &self,
        delay: Duration,
        kind: TimerKind,
        callback: TimerCallback,
    ) -> ClockResult<Timer> {
        let handle = Handle::try_current().map_err(|_| ClockError::NoRuntime)?;
        let delay = effective_delay(delay, kind);

        let now = Utc::now();
        let timer = Timer {
            id: TimerId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1),
            kind,
            scheduled_at: now,
            delay,
            due_at: due_after(now, delay)?,
        };
        self.shared.active.lock().insert(timer.id, timer.clone());
        debug!(timer = %timer.id, ?kind, ?delay, "调度真实定时器");

        handle.spawn(drive(
            Arc::downgrade(&self.shared),
            timer.id,
            kind,
            delay,
            callback,
        ));
        Ok(timer)
    }

    fn cancel(&self, timer: TimerId) -> bool {
        self.shared.active.lock().remove(&timer).is_some()
    }

    fn pending_timers(&self) -> usize {
        self.shared.active.lock().len()
    }
}

async fn drive(
    weak: Weak<SystemShared>,
    id: TimerId,
    kind: TimerKind,
    delay: Duration,
    mut callback: TimerCallback,
) {
    loop {
        tokio::time::sleep(delay).await;

        let Some(shared) = weak.upgrade() else {
            return;
        };
        {
            let mut active = shared.active.lock();
            match kind {
                TimerKind::Once => {
                    if active.remove(&id).is_none() {
                        return;
                    }
                }
                TimerKind::Repeating => {
                    let Some(timer) = active.get_mut(&id) else {
                        return;
                    };
                    let now = Utc::now();
                    match due_after(now, delay) {
                        Ok(next) => {
                            timer.scheduled_at = now;
                            timer.due_at = next;
                        }
                        Err(_) => {
                            active.remove(&id);
                        }
                    }
                }
            }
        }
        drop(shared);

        if let Err(error) = callback() {
            warn!(timer = %id, %error, "定时器回调失败");
        }
        if kind == TimerKind::Once {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> infrastructure_common::HookResult + Send) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_schedule_without_runtime_fails() {
        let clock = SystemClock::new();
        let (_, callback) = counter();
        let result = clock.schedule(Duration::from_millis(10), TimerKind::Once, Box::new(callback));
        assert!(matches!(result, Err(ClockError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_unrepresentable_due_time_is_rejected() {
        let clock = SystemClock::new();
        let (_, callback) = counter();
        let ages = Duration::from_secs(1_000_000 * 365 * 86_400);
        let result = clock.schedule(ages, TimerKind::Once, Box::new(callback));
        assert!(matches!(result, Err(ClockError::DelayOutOfRange { .. })));
        assert_eq!(clock.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_one_shot_fires_once() {
        let clock = SystemClock::new();
        let (count, callback) = counter();
        clock
            .schedule(Duration::from_millis(10), TimerKind::Once, Box::new(callback))
            .unwrap();
        assert_eq!(clock.pending_timers(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let clock = SystemClock::new();
        let (count, callback) = counter();
        let timer = clock
            .schedule(Duration::from_millis(30), TimerKind::Once, Box::new(callback))
            .unwrap();
        assert!(clock.cancel(timer.id));
        assert!(!clock.cancel(timer.id));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeating_timer_until_cancelled() {
        let clock = SystemClock::new();
        let (count, callback) = counter();
        let timer = clock
            .schedule(Duration::from_millis(10), TimerKind::Repeating, Box::new(callback))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        clock.cancel(timer.id);
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 2, "周期定时器应该多次触发, 实际 {fired}");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(count.load(Ordering::SeqCst) <= fired + 1);
    }
}

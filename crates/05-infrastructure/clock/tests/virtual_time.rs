//! 通过 `dyn Clock` 使用虚拟时钟的集成测试

use chrono::{TimeZone, Utc};
use infrastructure_clock::{Clock, ClockError, TimerKind, VirtualClock};
use infrastructure_common::HookResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_components_see_virtual_time_through_trait_object() {
    let start = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
    let virtual_clock = VirtualClock::paused_at(start);
    let clock: Arc<dyn Clock> = Arc::new(virtual_clock.clone());

    let polled = Arc::new(Mutex::new(Vec::new()));
    let seen = polled.clone();
    let observer = clock.clone();
    clock
        .set_interval(Duration::from_secs(60), move || -> HookResult {
            seen.lock().push(observer.now());
            Ok(())
        })
        .unwrap();

    let fired = virtual_clock.travel(Duration::from_secs(60 * 5)).unwrap();
    assert_eq!(fired, 5);

    let polled = polled.lock();
    assert_eq!(polled.len(), 5);
    assert!(polled.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(polled[4], start + chrono::Duration::minutes(5));
    assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
}

#[test]
fn test_timeout_and_interval_interleave_by_due_time() {
    let clock = VirtualClock::paused_at(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    let log = Arc::new(Mutex::new(Vec::new()));
    let dyn_clock: &dyn Clock = &clock;

    let interval_log = log.clone();
    dyn_clock
        .set_interval(Duration::from_millis(400), move || -> HookResult {
            interval_log.lock().push("tick");
            Ok(())
        })
        .unwrap();
    let timeout_log = log.clone();
    dyn_clock
        .set_timeout(Duration::from_millis(600), move || -> HookResult {
            timeout_log.lock().push("timeout");
            Ok(())
        })
        .unwrap();

    clock.travel(Duration::from_millis(1000)).unwrap();
    assert_eq!(*log.lock(), vec!["tick", "timeout", "tick"]);
}

#[test]
fn test_error_in_replay_reported_after_all_due_callbacks() {
    let clock = VirtualClock::paused_at(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    let dyn_clock: &dyn Clock = &clock;
    let completed = Arc::new(AtomicUsize::new(0));

    dyn_clock
        .set_timeout(Duration::from_millis(100), || -> HookResult {
            Err("poll failed".into())
        })
        .unwrap();
    for delay in [200, 300] {
        let completed = completed.clone();
        dyn_clock
            .set_timeout(Duration::from_millis(delay), move || -> HookResult {
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    }

    let err = clock.travel(Duration::from_millis(1000)).unwrap_err();
    assert!(matches!(err, ClockError::CallbackFailed { .. }));
    assert!(err.to_string().contains("poll failed"));
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert_eq!(clock.pending_timers(), 0);
}

#[tokio::test]
async fn test_pause_then_reset_returns_to_real_time() {
    let clock = VirtualClock::new();
    clock.pause();
    let frozen = clock.now();
    clock.travel(Duration::from_secs(3600)).unwrap();
    assert_eq!(clock.now(), frozen + chrono::Duration::hours(1));

    clock.reset();
    let real = clock.now();
    assert!(real < frozen + chrono::Duration::minutes(1));
    assert!(matches!(
        clock.travel(Duration::from_secs(1)),
        Err(ClockError::NotPaused)
    ));
}

//! Integration tests for the fixed-interval tick scheduler.
//!
//! Runs with Tokio's paused clock so `sleep_until` resolves as soon as the
//! runtime is idle and tick timing is deterministic.

use std::time::Duration;

use lockstep_tick::{TickConfig, TickPolicy, TickScheduler};

// =========================================================================
// Helpers
// =========================================================================

fn config_33ms() -> TickConfig {
    TickConfig {
        initial_jitter: Duration::ZERO,
        ..TickConfig::with_interval(Duration::from_millis(33))
    }
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_is_battle_interval() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.interval, Duration::from_millis(33));
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_validated_clamps_zero_interval() {
    let cfg = TickConfig::with_interval(Duration::ZERO).validated();
    assert_eq!(cfg.interval, TickConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_orders_thresholds() {
    let cfg = TickConfig {
        budget_warn_threshold: 1.5,
        budget_critical_threshold: 0.5,
        ..TickConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_critical_threshold, 0.5);
    assert_eq!(cfg.budget_warn_threshold, 0.5);
}

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(config_33ms());
    assert_eq!(s.tick_count(), 0);
    assert_eq!(s.interval(), Duration::from_millis(33));
    assert_eq!(s.metrics().total_ticks, 0);
    assert_eq!(s.metrics().max_tick_time, Duration::ZERO);
}

// =========================================================================
// Tick firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_one_interval() {
    let start = tokio::time::Instant::now();
    let mut s = TickScheduler::new(config_33ms());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert_eq!(info.dt, Duration::from_millis(33));
    assert!(!info.overrun);
    assert_eq!(start.elapsed(), Duration::from_millis(33));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_evenly_spaced() {
    let start = tokio::time::Instant::now();
    let mut s = TickScheduler::new(config_33ms());

    for expected in 1..=5u64 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(
            start.elapsed(),
            Duration::from_millis(33 * expected),
            "tick {expected} fired off schedule"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_within_bound() {
    let start = tokio::time::Instant::now();
    let mut s = TickScheduler::new(TickConfig {
        initial_jitter: Duration::from_millis(5),
        ..config_33ms()
    });

    s.wait_for_tick().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(33));
    // Timer deadlines round up to the next millisecond.
    assert!(elapsed <= Duration::from_millis(38));
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_skips_missed_ticks() {
    let mut s = TickScheduler::new(config_33ms());
    s.wait_for_tick().await;

    // Stall for a bit over three intervals past the next deadline.
    tokio::time::advance(Duration::from_millis(33 + 100)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
    assert_eq!(s.metrics().total_skipped, 3);
    assert_eq!(s.metrics().total_overruns, 1);

    // Next tick is a full interval after the late one.
    let before = tokio::time::Instant::now();
    s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::from_millis(33));
}

#[tokio::test(start_paused = true)]
async fn test_catchup_policy_fires_missed_ticks_immediately() {
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::CatchUp { max_catchup: 5 },
        ..config_33ms()
    });
    s.wait_for_tick().await;

    tokio::time::advance(Duration::from_millis(33 + 70)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 0);

    // The following tick is already overdue, so it fires without waiting.
    let before = tokio::time::Instant::now();
    s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_catchup_policy_caps_backlog() {
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::CatchUp { max_catchup: 1 },
        ..config_33ms()
    });
    s.wait_for_tick().await;

    tokio::time::advance(Duration::from_millis(33 + 100)).await;
    let info = s.wait_for_tick().await;
    assert_eq!(info.ticks_skipped, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_schedule() {
    let start = tokio::time::Instant::now();
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::Drop,
        ..config_33ms()
    });
    s.wait_for_tick().await;

    tokio::time::advance(Duration::from_millis(33 + 20)).await;
    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 0);

    // Third tick lands on the original 33 ms grid.
    s.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(99));
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_metrics_total_ticks_increments() {
    let mut s = TickScheduler::new(config_33ms());
    for _ in 0..3 {
        s.wait_for_tick().await;
        s.record_tick_end();
    }
    assert_eq!(s.metrics().total_ticks, 3);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(config_33ms());
    s.record_tick_end();
    assert_eq!(s.metrics().total_ticks, 0);
    assert_eq!(s.metrics().budget_utilization, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_budget_utilization_under_budget() {
    let mut s = TickScheduler::new(config_33ms());
    s.wait_for_tick().await;
    // Execution time is measured on the wall clock.
    std::thread::sleep(Duration::from_micros(50));
    s.record_tick_end();

    let util = s.metrics().budget_utilization;
    assert!(util > 0.0);
    assert!(util < 1.0);
    assert!(s.metrics().max_tick_time > Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_disabled_skips_timing() {
    let mut s = TickScheduler::new(TickConfig {
        metrics_enabled: false,
        ..config_33ms()
    });
    s.wait_for_tick().await;
    std::thread::sleep(Duration::from_micros(50));
    s.record_tick_end();

    assert_eq!(s.metrics().avg_tick_time, Duration::ZERO);
    assert_eq!(s.metrics().max_tick_time, Duration::ZERO);
}

// =========================================================================
// select! loop with cancellation (mirrors the room tick task)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_stops_on_signal() {
    let mut s = TickScheduler::new(config_33ms());
    let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(110)).await;
        let _ = tx.send(());
    });

    let mut ticks_fired = 0u64;
    loop {
        tokio::select! {
            _ = &mut rx => break,
            info = s.wait_for_tick() => {
                ticks_fired += 1;
                s.record_tick_end();
                assert_eq!(info.tick, ticks_fired);
            }
        }
    }
    assert_eq!(ticks_fired, 3);
}

//! Next-alarm calculation over a session's timer triggers.
//!
//! Each trigger evaluator is a pure function of `(state, now_sec)` returning
//! the seconds left until it expires, or `None` when it does not apply. The
//! only mutation is the ZB12 modified flag, consumed by
//! [`consume_zb12_modified`] after all evaluators have run.
//!
//! Elapsed time saturates at zero when a recorded start lies ahead of
//! `now_sec`, and remaining time saturates at zero once a limit has been
//! exceeded, so an overdue trigger yields "fire now".

use super::types::*;
use meter_shared::{
    SessionState, OPERATIONAL_FLAG_TIME_QUOTA_PRESENT, OPERATIONAL_FLAG_ZB12_MODIFIED,
    OPERATIONAL_FLAG_ZB12_STOPPED, ZJ77_REPORTING_TRIGGERS_DY9X, ZJ77_REPORTING_TRIGGERS_P88N,
    ZJ77_REPORTING_TRIGGERS_ZB12,
};

pub type Evaluator = fn(&SessionState, u32) -> Option<u64>;

/// Fixed evaluation table. Ties resolve to the earlier entry.
pub const EVALUATORS: [(Trigger, Evaluator); 6] = [
    (Trigger::IdleTimeout, idle_timeout),
    (Trigger::P88nThreshold, p88n_threshold),
    (Trigger::TimeQuota, time_quota),
    (Trigger::Zb12HoldingTime, zb12_holding_time),
    (Trigger::Dy9xPeriodic, dy9x_periodic),
    (Trigger::MonitoringTime, monitoring_time),
];

#[inline]
fn elapsed(now_sec: u32, since: u32) -> u64 {
    u64::from(now_sec.saturating_sub(since))
}

#[inline]
fn remaining(limit: u32, consumed: u64) -> u64 {
    u64::from(limit).saturating_sub(consumed)
}

fn idle_timeout(state: &SessionState, now_sec: u32) -> Option<u64> {
    if !state.duration_measurement.active || state.idt_alarm_time == 0 {
        return None;
    }
    Some(remaining(
        state.idt_alarm_time,
        elapsed(now_sec, state.last_packet_time),
    ))
}

fn p88n_threshold(state: &SessionState, now_sec: u32) -> Option<u64> {
    let dm = &state.duration_measurement;
    if !dm.active
        || !state.has_reporting_flag(ZJ77_REPORTING_TRIGGERS_P88N)
        || state.time_threshold == 0
    {
        return None;
    }
    let consumed = u64::from(dm.meas)
        + u64::from(dm.meas_threshold_used)
        + elapsed(now_sec, dm.meas_start);
    Some(remaining(state.time_threshold, consumed))
}

fn time_quota(state: &SessionState, now_sec: u32) -> Option<u64> {
    let dm = &state.duration_measurement;
    if !dm.active
        || !state.has_operational_flag(OPERATIONAL_FLAG_TIME_QUOTA_PRESENT)
        || state.time_quota == 0
    {
        return None;
    }
    let consumed = u64::from(dm.meas) + elapsed(now_sec, dm.meas_start);
    Some(remaining(state.time_quota, consumed))
}

fn zb12_applies(state: &SessionState) -> bool {
    state.has_reporting_flag(ZJ77_REPORTING_TRIGGERS_ZB12)
        && state.quota_holding_time != 0
        && !state.has_operational_flag(OPERATIONAL_FLAG_ZB12_STOPPED)
}

// 新規設定・変更直後は設定値そのままで開始、それ以外は最終パケットからの経過分を差し引く
fn zb12_restarts_from_full(state: &SessionState) -> bool {
    state.has_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED) || state.last_packet_time == 0
}

fn zb12_holding_time(state: &SessionState, now_sec: u32) -> Option<u64> {
    if !zb12_applies(state) {
        return None;
    }
    if zb12_restarts_from_full(state) {
        return Some(u64::from(state.quota_holding_time));
    }
    Some(remaining(
        state.quota_holding_time,
        elapsed(now_sec, state.last_packet_time),
    ))
}

fn dy9x_periodic(state: &SessionState, now_sec: u32) -> Option<u64> {
    if !state.has_reporting_flag(ZJ77_REPORTING_TRIGGERS_DY9X) || state.meas_periodic_duration == 0
    {
        return None;
    }
    Some(remaining(
        state.meas_periodic_duration,
        elapsed(now_sec, state.periodic_meas_start),
    ))
}

fn monitoring_time(state: &SessionState, now_sec: u32) -> Option<u64> {
    if state.monitoring_time_ts == 0 {
        return None;
    }
    Some(remaining(
        state.monitoring_time_ts,
        elapsed(now_sec, state.monitoring_time_start),
    ))
}

// 経過時間の基準となる時刻 (経過時間を使わない場合は None)
fn reference_time(trigger: Trigger, state: &SessionState) -> Option<u32> {
    match trigger {
        Trigger::IdleTimeout => Some(state.last_packet_time),
        Trigger::P88nThreshold | Trigger::TimeQuota => {
            Some(state.duration_measurement.meas_start)
        }
        Trigger::Zb12HoldingTime if zb12_restarts_from_full(state) => None,
        Trigger::Zb12HoldingTime => Some(state.last_packet_time),
        Trigger::Dy9xPeriodic => Some(state.periodic_meas_start),
        Trigger::MonitoringTime => Some(state.monitoring_time_start),
    }
}

/// Every applicable trigger with its remaining seconds, in table order.
pub fn evaluate_triggers(state: &SessionState, now_sec: u32) -> Vec<TriggerDeadline> {
    EVALUATORS
        .iter()
        .filter_map(|(trigger, evaluate)| {
            evaluate(state, now_sec).map(|remaining_secs| TriggerDeadline {
                trigger: *trigger,
                remaining_secs,
            })
        })
        .collect()
}

/// The trigger that expires first, if any applies.
pub fn soonest_trigger(state: &SessionState, now_sec: u32) -> Option<TriggerDeadline> {
    evaluate_triggers(state, now_sec)
        .into_iter()
        .min_by_key(|deadline| deadline.remaining_secs)
}

/// True when an applicable trigger measures elapsed time from an instant
/// later than `now_sec`.
pub fn is_clock_skewed(state: &SessionState, now_sec: u32) -> bool {
    evaluate_triggers(state, now_sec).iter().any(|deadline| {
        reference_time(deadline.trigger, state).is_some_and(|start| start > now_sec)
    })
}

/// Clears ZB12_MODIFIED if the holding timer applies and the flag is set.
/// Returns whether the flag was consumed.
pub fn consume_zb12_modified(state: &mut SessionState) -> bool {
    zb12_applies(state) && state.test_and_clear_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED)
}

/// Computes the next alarm, bounded by `upper_bound_ms`, and consumes the
/// ZB12 modified flag.
pub fn next_alarm(state: &mut SessionState, now_sec: u32, upper_bound_ms: u64) -> NextAlarm {
    let soonest = soonest_trigger(state, now_sec);
    consume_zb12_modified(state);

    match soonest {
        Some(deadline) => {
            let trigger_ms = deadline.remaining_secs.saturating_mul(1000);
            if trigger_ms < upper_bound_ms {
                NextAlarm {
                    delay_ms: trigger_ms,
                    trigger: Some(deadline.trigger),
                }
            } else {
                NextAlarm {
                    delay_ms: upper_bound_ms,
                    trigger: None,
                }
            }
        }
        None => NextAlarm {
            delay_ms: upper_bound_ms,
            trigger: None,
        },
    }
}

/// Milliseconds until the next alarm, never more than `upper_bound_ms`.
pub fn compute_next_alarm(state: &mut SessionState, now_sec: u32, upper_bound_ms: u64) -> u64 {
    next_alarm(state, now_sec, upper_bound_ms).delay_ms
}

/// Accumulator form: lowers `min_value_ms` to the next alarm if it is sooner.
pub fn how_long_until_next_alarm(state: &mut SessionState, now_sec: u32, min_value_ms: &mut u64) {
    *min_value_ms = compute_next_alarm(state, now_sec, *min_value_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUND: u64 = 1_000_000;

    fn zb12_state(holding: u32) -> SessionState {
        let mut state = SessionState::new();
        state.add_reporting_flag(ZJ77_REPORTING_TRIGGERS_ZB12);
        state.quota_holding_time = holding;
        state
    }

    #[test]
    fn test_no_triggers_returns_bound() {
        let mut state = SessionState::new();
        assert_eq!(compute_next_alarm(&mut state, 100, BOUND), BOUND);
        assert!(evaluate_triggers(&state, 100).is_empty());
    }

    #[test]
    fn test_idle_timeout() {
        let mut state = SessionState::new();
        state.idt_alarm_time = 50;
        state.last_packet_time = 10;
        state.duration_measurement.active = true;

        assert_eq!(compute_next_alarm(&mut state, 20, BOUND), 40_000);
    }

    #[test]
    fn test_idle_timeout_requires_active_measurement() {
        let mut state = SessionState::new();
        state.idt_alarm_time = 50;
        state.last_packet_time = 10;

        assert_eq!(compute_next_alarm(&mut state, 20, BOUND), BOUND);
    }

    #[test]
    fn test_p88n_threshold() {
        let mut state = SessionState::new();
        state.add_reporting_flag(ZJ77_REPORTING_TRIGGERS_P88N);
        state.time_threshold = 100;
        state.start_duration_measurement(50);
        state.duration_measurement.meas = 10;
        state.duration_measurement.meas_threshold_used = 5;

        // 100 - (10 + 5 + 20) = 65
        assert_eq!(compute_next_alarm(&mut state, 70, BOUND), 65_000);
    }

    #[test]
    fn test_time_quota() {
        let mut state = SessionState::new();
        state.add_operational_flag(OPERATIONAL_FLAG_TIME_QUOTA_PRESENT);
        state.time_quota = 300;
        state.start_duration_measurement(100);
        state.duration_measurement.meas = 30;
        state.duration_measurement.meas_threshold_used = 999;

        // threshold_used does not count against the quota
        assert_eq!(compute_next_alarm(&mut state, 120, BOUND), 250_000);
    }

    #[test]
    fn test_time_quota_requires_flag() {
        let mut state = SessionState::new();
        state.time_quota = 300;
        state.start_duration_measurement(100);

        assert_eq!(compute_next_alarm(&mut state, 120, BOUND), BOUND);
    }

    #[test]
    fn test_zb12_unmodified_subtracts_idle_time() {
        let mut state = zb12_state(100);
        state.last_packet_time = 40;

        assert_eq!(compute_next_alarm(&mut state, 60, BOUND), 80_000);
        assert!(!state.has_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED));
    }

    #[test]
    fn test_zb12_without_traffic_uses_full_value() {
        let mut state = zb12_state(100);
        assert_eq!(compute_next_alarm(&mut state, 60, BOUND), 100_000);
    }

    #[test]
    fn test_zb12_modified_flag_consumed_once() {
        let mut state = zb12_state(100);
        state.last_packet_time = 40;
        state.add_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED);

        assert_eq!(compute_next_alarm(&mut state, 60, BOUND), 100_000);
        assert!(!state.has_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED));

        assert_eq!(compute_next_alarm(&mut state, 60, BOUND), 80_000);
        assert!(!state.has_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED));
    }

    #[test]
    fn test_zb12_stopped_keeps_modified_flag() {
        let mut state = zb12_state(100);
        state.add_operational_flag(OPERATIONAL_FLAG_ZB12_STOPPED);
        state.add_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED);

        assert_eq!(compute_next_alarm(&mut state, 60, BOUND), BOUND);
        assert!(state.has_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED));
        assert!(!consume_zb12_modified(&mut state));
    }

    #[test]
    fn test_dy9x_periodic() {
        let mut state = SessionState::new();
        state.add_reporting_flag(ZJ77_REPORTING_TRIGGERS_DY9X);
        state.meas_periodic_duration = 60;
        state.periodic_meas_start = 1000;

        assert_eq!(compute_next_alarm(&mut state, 1045, BOUND), 15_000);
    }

    #[test]
    fn test_monitoring_time_clamped_by_bound() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 30;
        state.monitoring_time_start = 5;

        let next = next_alarm(&mut state, 10, 5000);
        assert_eq!(next.delay_ms, 5000);
        assert_eq!(next.trigger, None);
    }

    #[test]
    fn test_minimum_across_triggers() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 30;
        state.monitoring_time_start = 0;
        state.add_reporting_flag(ZJ77_REPORTING_TRIGGERS_DY9X);
        state.meas_periodic_duration = 12;
        state.periodic_meas_start = 0;

        let next = next_alarm(&mut state, 2, BOUND);
        assert_eq!(next.delay_ms, 10_000);
        assert_eq!(next.trigger, Some(Trigger::Dy9xPeriodic));
    }

    #[test]
    fn test_tie_resolves_to_table_order() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 10;
        state.add_reporting_flag(ZJ77_REPORTING_TRIGGERS_DY9X);
        state.meas_periodic_duration = 10;

        let soonest = soonest_trigger(&state, 0).unwrap();
        assert_eq!(soonest.trigger, Trigger::Dy9xPeriodic);
        assert_eq!(soonest.remaining_secs, 10);
    }

    #[test]
    fn test_expired_trigger_fires_now() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 30;
        state.monitoring_time_start = 5;

        assert_eq!(compute_next_alarm(&mut state, 500, BOUND), 0);
    }

    #[test]
    fn test_start_in_future_counts_as_no_elapsed_time() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 30;
        state.monitoring_time_start = 200;

        assert!(is_clock_skewed(&state, 100));
        assert_eq!(compute_next_alarm(&mut state, 100, BOUND), 30_000);
        assert!(!is_clock_skewed(&state, 200));
    }

    #[test]
    fn test_skew_ignores_inapplicable_triggers() {
        let mut state = SessionState::new();
        state.periodic_meas_start = 500;
        assert!(!is_clock_skewed(&state, 100));
    }

    #[test]
    fn test_accumulator_only_decreases() {
        let mut state = SessionState::new();
        state.monitoring_time_ts = 30;

        let mut min_value_ms = 10_000;
        how_long_until_next_alarm(&mut state, 0, &mut min_value_ms);
        assert_eq!(min_value_ms, 10_000);

        let mut min_value_ms = BOUND;
        how_long_until_next_alarm(&mut state, 0, &mut min_value_ms);
        assert_eq!(min_value_ms, 30_000);
    }
}

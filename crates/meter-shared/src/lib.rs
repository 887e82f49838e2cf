use serde::{Deserialize, Serialize};

// Operational flags
pub const OPERATIONAL_FLAG_TIME_QUOTA_PRESENT: u32 = 0x0000_0001;
pub const OPERATIONAL_FLAG_ZB12_STOPPED: u32 = 0x0000_0002;
pub const OPERATIONAL_FLAG_ZB12_MODIFIED: u32 = 0x0000_0004;

// Reporting triggers
pub const ZJ77_REPORTING_TRIGGERS_P88N: u32 = 0x0000_0001;
pub const ZJ77_REPORTING_TRIGGERS_ZB12: u32 = 0x0000_0002;
pub const ZJ77_REPORTING_TRIGGERS_DY9X: u32 = 0x0000_0004;

/// Session identifier assigned by the owner of the session table
pub type SessionId = u64;

/// In-progress duration measurement window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationMeasurement {
    pub active: bool,
    pub meas_start: u32,
    pub meas: u32,
    pub meas_threshold_used: u32,
    pub bti_time_interval: u32,
}

/// Per-session counters and timer configuration.
///
/// All durations are seconds and all timestamps are seconds on the caller's
/// clock. A zero duration means the corresponding timer is disabled; a zero
/// `last_packet_time` means no traffic has been seen yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub operational_flags: u32,
    pub reporting_flags: u32,
    pub last_packet_time: u32,
    pub idt_alarm_time: u32,
    pub time_threshold: u32,
    pub time_quota: u32,
    pub duration_measurement: DurationMeasurement,
    pub quota_holding_time: u32,
    pub meas_periodic_duration: u32,
    pub periodic_meas_start: u32,
    pub monitoring_time_ts: u32,
    pub monitoring_time_start: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper: Flag checks
    pub fn has_operational_flag(&self, flag: u32) -> bool {
        self.operational_flags & flag != 0
    }

    pub fn has_reporting_flag(&self, flag: u32) -> bool {
        self.reporting_flags & flag != 0
    }

    // Helper: Flag updates (OR, so re-adding a flag is harmless)
    pub fn add_operational_flag(&mut self, flag: u32) {
        self.operational_flags |= flag;
    }

    pub fn add_reporting_flag(&mut self, flag: u32) {
        self.reporting_flags |= flag;
    }

    pub fn clear_operational_flag(&mut self, flag: u32) {
        self.operational_flags &= !flag;
    }

    /// Returns whether `flag` was set, clearing it in the same step.
    pub fn test_and_clear_operational_flag(&mut self, flag: u32) -> bool {
        let was_set = self.has_operational_flag(flag);
        if was_set {
            self.clear_operational_flag(flag);
        }
        was_set
    }

    pub fn start_duration_measurement(&mut self, now_sec: u32) {
        self.duration_measurement.active = true;
        self.duration_measurement.meas_start = now_sec;
    }

    pub fn stop_duration_measurement(&mut self) {
        self.duration_measurement.active = false;
    }

    pub fn record_packet(&mut self, now_sec: u32) {
        self.last_packet_time = now_sec;
    }

    /// Sets a new ZB12 holding time. The next alarm computation restarts the
    /// holding timer from this full value.
    pub fn set_quota_holding_time(&mut self, secs: u32) {
        self.quota_holding_time = secs;
        self.add_operational_flag(OPERATIONAL_FLAG_ZB12_MODIFIED);
    }
}

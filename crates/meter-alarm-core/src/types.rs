use meter_shared::SessionId;
use std::fmt;

// タイマー発火条件 (評価順 = テーブル順)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    IdleTimeout,
    P88nThreshold,
    TimeQuota,
    Zb12HoldingTime,
    Dy9xPeriodic,
    MonitoringTime,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle-timeout",
            Self::P88nThreshold => "p88n-threshold",
            Self::TimeQuota => "time-quota",
            Self::Zb12HoldingTime => "zb12-holding-time",
            Self::Dy9xPeriodic => "dy9x-periodic",
            Self::MonitoringTime => "monitoring-time",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// 1つのトリガーの残り時間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDeadline {
    pub trigger: Trigger,
    pub remaining_secs: u64,
}

// 次のアラームまでの時間 (trigger が None = 上限値がそのまま採用された)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextAlarm {
    pub delay_ms: u64,
    pub trigger: Option<Trigger>,
}

// アラーム発火時の情報（Runtime層でのログ・監視用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFired {
    pub session_id: SessionId,
    pub now_sec: u32,
    pub trigger: Option<Trigger>,
}

// ドメインイベント: CoreからRuntimeへの命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmAction {
    // タイマーを (再) セットせよ
    Arm {
        session_id: SessionId,
        delay_ms: u64,
        trigger: Option<Trigger>,
    },
    // タイマーを解除せよ
    Disarm(SessionId),
    // 発火を通知せよ
    Fire(AlarmFired),
    // 開始時刻が現在時刻より未来にある (ログ・監視用)
    ClockSkew { session_id: SessionId, now_sec: u32 },
}

// 設定
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub upper_bound_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            upper_bound_ms: 60_000,
        }
    }
}

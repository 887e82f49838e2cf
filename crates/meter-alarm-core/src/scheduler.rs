use super::alarm::{is_clock_skewed, next_alarm};
use super::types::*;
use meter_shared::{SessionId, SessionState};
use std::collections::HashMap;

// セット済みタイマー: いつ、何のトリガーで、何ミリ秒後に設定したか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArmedAlarm {
    armed_at: u32,
    delay_ms: u64,
    trigger: Option<Trigger>,
}

impl ArmedAlarm {
    // トリガー由来のタイマーが期限に達したか (上限値のみのタイマーは対象外)
    fn is_due(&self, now_sec: u32) -> bool {
        self.trigger.is_some()
            && u64::from(now_sec) * 1000 >= u64::from(self.armed_at) * 1000 + self.delay_ms
    }
}

// ★ Sans-IO Core Logic
pub struct AlarmSchedulerCore {
    // 監視中のセッション
    sessions: HashMap<SessionId, SessionState>,
    // セッションごとの現在のタイマー
    armed: HashMap<SessionId, ArmedAlarm>,
    pub config: SchedulerConfig,
}

impl AlarmSchedulerCore {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            armed: HashMap::new(),
            config,
        }
    }

    // イベント1: セッションの登録・更新
    pub fn on_session_upsert(
        &mut self,
        session_id: SessionId,
        state: SessionState,
        now_sec: u32,
    ) -> Vec<AlarmAction> {
        self.sessions.insert(session_id, state);
        self.rearm(session_id, now_sec)
    }

    // イベント2: パケット受信 (最終パケット時刻を更新して再計算)
    pub fn on_packet(&mut self, session_id: SessionId, now_sec: u32) -> Vec<AlarmAction> {
        match self.sessions.get_mut(&session_id) {
            Some(state) => state.record_packet(now_sec),
            None => return vec![],
        }
        self.rearm(session_id, now_sec)
    }

    // イベント3: セッション削除
    pub fn on_session_removed(&mut self, session_id: SessionId) -> Vec<AlarmAction> {
        self.armed.remove(&session_id);
        if self.sessions.remove(&session_id).is_some() {
            vec![AlarmAction::Disarm(session_id)]
        } else {
            vec![]
        }
    }

    // イベント4: タイマー満了 (RuntimeのDelayQueueから呼ばれる)
    pub fn on_alarm_expired(&mut self, session_id: SessionId, now_sec: u32) -> Vec<AlarmAction> {
        let upper_bound_ms = self.config.upper_bound_ms;
        let Some(state) = self.sessions.get_mut(&session_id) else {
            // 既に削除済みなら何もしない
            return vec![];
        };

        let mut actions = Vec::new();
        if is_clock_skewed(state, now_sec) {
            actions.push(AlarmAction::ClockSkew {
                session_id,
                now_sec,
            });
        }

        // セット時のトリガーが期限に達していれば、再計算結果に関わらず発火する
        // (保持タイマーは再計算すると満額に戻ることがある)
        let due = self
            .armed
            .get(&session_id)
            .filter(|armed| armed.is_due(now_sec))
            .map(|armed| armed.trigger);
        let fired_trigger = match due {
            Some(trigger) => Some(trigger),
            None => {
                let next = next_alarm(state, now_sec, upper_bound_ms);
                if next.delay_ms == 0 {
                    Some(next.trigger)
                } else {
                    self.armed.insert(
                        session_id,
                        ArmedAlarm {
                            armed_at: now_sec,
                            delay_ms: next.delay_ms,
                            trigger: next.trigger,
                        },
                    );
                    actions.push(AlarmAction::Arm {
                        session_id,
                        delay_ms: next.delay_ms,
                        trigger: next.trigger,
                    });
                    None
                }
            }
        };

        if let Some(trigger) = fired_trigger {
            // 発火: セッションの所有者が状態を更新するまで再セットしない
            self.armed.remove(&session_id);
            actions.push(AlarmAction::Fire(AlarmFired {
                session_id,
                now_sec,
                trigger,
            }));
        }
        actions
    }

    /// Next delay for a session without consuming its ZB12 modified flag.
    pub fn peek_next_alarm(&self, session_id: SessionId, now_sec: u32) -> Option<u64> {
        let mut state = self.sessions.get(&session_id)?.clone();
        Some(next_alarm(&mut state, now_sec, self.config.upper_bound_ms).delay_ms)
    }

    pub fn session(&self, session_id: SessionId) -> Option<&SessionState> {
        self.sessions.get(&session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn rearm(&mut self, session_id: SessionId, now_sec: u32) -> Vec<AlarmAction> {
        let upper_bound_ms = self.config.upper_bound_ms;
        let Some(state) = self.sessions.get_mut(&session_id) else {
            return vec![];
        };

        let mut actions = Vec::new();
        if is_clock_skewed(state, now_sec) {
            actions.push(AlarmAction::ClockSkew {
                session_id,
                now_sec,
            });
        }

        let next = next_alarm(state, now_sec, upper_bound_ms);
        self.armed.insert(
            session_id,
            ArmedAlarm {
                armed_at: now_sec,
                delay_ms: next.delay_ms,
                trigger: next.trigger,
            },
        );
        actions.push(AlarmAction::Arm {
            session_id,
            delay_ms: next.delay_ms,
            trigger: next.trigger,
        });
        actions
    }
}

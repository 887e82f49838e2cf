use crate::clock::Clock;
use crate::error::{Result, RuntimeError};
use futures::stream::StreamExt;
use meter_alarm_core::{AlarmAction, AlarmFired, AlarmSchedulerCore, SchedulerConfig};
use meter_metrics::{
    ACTIVE_SESSIONS, ALARMS_FIRED_TOTAL, ALARM_COMPUTATIONS_TOTAL, CLOCK_SKEW_TOTAL,
    NEXT_ALARM_SECONDS,
};
use meter_shared::{SessionId, SessionState};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info, warn};

// Actorへの入力メッセージ
#[derive(Debug)]
pub enum ActorMessage {
    Upsert {
        session_id: SessionId,
        state: SessionState,
    },
    Packet {
        session_id: SessionId,
    },
    Remove {
        session_id: SessionId,
    },
    Query {
        session_id: SessionId,
        reply: oneshot::Sender<Option<u64>>,
    },
}

pub struct AlarmActor<C: Clock> {
    core: AlarmSchedulerCore,
    clock: C,
    receiver: mpsc::Receiver<ActorMessage>,

    // タイマー管理用キュー: セッションIDを入れておくと、指定時間後に取り出せる
    timer_queue: DelayQueue<SessionId>,
    timers: HashMap<SessionId, delay_queue::Key>,

    // 発火通知の出力先
    fired_tx: mpsc::Sender<AlarmFired>,
}

impl<C: Clock> AlarmActor<C> {
    pub fn new(
        config: SchedulerConfig,
        clock: C,
        receiver: mpsc::Receiver<ActorMessage>,
        fired_tx: mpsc::Sender<AlarmFired>,
    ) -> Self {
        Self {
            core: AlarmSchedulerCore::new(config),
            clock,
            receiver,
            timer_queue: DelayQueue::new(),
            timers: HashMap::new(),
            fired_tx,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // 1. 外部からのメッセージ受信
                msg = self.receiver.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break, // チャネルが閉じたら終了
                },

                // 2. タイマー満了
                Some(expired) = self.timer_queue.next(), if !self.timer_queue.is_empty() => {
                    let session_id = expired.into_inner();
                    self.timers.remove(&session_id);
                    let actions = self.core.on_alarm_expired(session_id, self.clock.now_sec());
                    self.execute_actions(actions).await;
                }
            }
        }
        debug!(sessions = self.core.len(), "Alarm actor stopped");
    }

    async fn handle_message(&mut self, msg: ActorMessage) {
        let now_sec = self.clock.now_sec();
        let actions = match msg {
            ActorMessage::Upsert { session_id, state } => {
                self.core.on_session_upsert(session_id, state, now_sec)
            }
            ActorMessage::Packet { session_id } => self.core.on_packet(session_id, now_sec),
            ActorMessage::Remove { session_id } => self.core.on_session_removed(session_id),
            ActorMessage::Query { session_id, reply } => {
                // 問い合わせ側が先に諦めていても問題ない
                let _ = reply.send(self.core.peek_next_alarm(session_id, now_sec));
                vec![]
            }
        };

        self.execute_actions(actions).await;
        ACTIVE_SESSIONS.set(self.core.len() as i64);
    }

    async fn execute_actions(&mut self, actions: Vec<AlarmAction>) {
        for action in actions {
            match action {
                AlarmAction::Arm {
                    session_id,
                    delay_ms,
                    trigger,
                } => {
                    ALARM_COMPUTATIONS_TOTAL.inc();
                    NEXT_ALARM_SECONDS.observe(delay_ms as f64 / 1000.0);
                    debug!(session_id, delay_ms, trigger = ?trigger, "Arming alarm");
                    self.arm(session_id, Duration::from_millis(delay_ms));
                }
                AlarmAction::Disarm(session_id) => {
                    debug!(session_id, "Disarming alarm");
                    if let Some(key) = self.timers.remove(&session_id) {
                        self.timer_queue.remove(&key);
                    }
                }
                AlarmAction::Fire(fired) => {
                    ALARM_COMPUTATIONS_TOTAL.inc();
                    ALARMS_FIRED_TOTAL.inc();
                    info!(
                        session_id = fired.session_id,
                        now_sec = fired.now_sec,
                        trigger = ?fired.trigger,
                        "Alarm fired"
                    );
                    if let Err(e) = self.fired_tx.send(fired).await {
                        warn!("Failed to deliver fired alarm: {}", e);
                    }
                }
                AlarmAction::ClockSkew {
                    session_id,
                    now_sec,
                } => {
                    CLOCK_SKEW_TOTAL.inc();
                    warn!(session_id, now_sec, "Recorded start time is ahead of clock");
                }
            }
        }
    }

    fn arm(&mut self, session_id: SessionId, delay: Duration) {
        match self.timers.get(&session_id) {
            Some(key) => self.timer_queue.reset(key, delay),
            None => {
                let key = self.timer_queue.insert(session_id, delay);
                self.timers.insert(session_id, key);
            }
        }
    }
}

/// Cloneable sender side of an [`AlarmActor`]
#[derive(Debug, Clone)]
pub struct AlarmHandle {
    tx: mpsc::Sender<ActorMessage>,
}

impl AlarmHandle {
    pub fn new(tx: mpsc::Sender<ActorMessage>) -> Self {
        Self { tx }
    }

    pub async fn upsert(&self, session_id: SessionId, state: SessionState) -> Result<()> {
        self.send(ActorMessage::Upsert { session_id, state }).await
    }

    pub async fn packet(&self, session_id: SessionId) -> Result<()> {
        self.send(ActorMessage::Packet { session_id }).await
    }

    pub async fn remove(&self, session_id: SessionId) -> Result<()> {
        self.send(ActorMessage::Remove { session_id }).await
    }

    /// Milliseconds until the session's next alarm, `None` for unknown sessions.
    pub async fn next_alarm_ms(&self, session_id: SessionId) -> Result<Option<u64>> {
        let (reply, rx) = oneshot::channel();
        self.send(ActorMessage::Query { session_id, reply }).await?;
        rx.await.map_err(|_| RuntimeError::ReplyDropped(session_id))
    }

    async fn send(&self, msg: ActorMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// Spawns an alarm actor on the current runtime.
pub fn spawn<C: Clock>(
    config: SchedulerConfig,
    clock: C,
    channel_capacity: usize,
) -> (AlarmHandle, mpsc::Receiver<AlarmFired>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let (fired_tx, fired_rx) = mpsc::channel(channel_capacity);
    let actor = AlarmActor::new(config, clock, rx, fired_tx);
    let task = tokio::spawn(actor.run());
    (AlarmHandle::new(tx), fired_rx, task)
}

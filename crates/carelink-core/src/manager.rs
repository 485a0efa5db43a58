// ── Realtime channel manager ──
//
// One task owns the transport, the timers, the subscription set and the
// callbacks. The `ChannelManager` handle only queues commands and reads
// the published state, so every transition, timer firing and dispatch
// happens sequentially on that task and nothing needs a lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use carelink_api::{
    ClientMessage, CloseInfo, Connection, Connector, Incoming, ServerEvent, ThreadId, decode_event,
};

use crate::backoff::calculate_backoff;
use crate::callbacks::Callbacks;
use crate::config::ChannelConfig;
use crate::error::CoreError;
use crate::identity::{Identity, redact_url};
use crate::state::{ChannelState, RejectReason};
use crate::subscriptions::SubscriptionSet;

/// `tokio::time::interval` panics on a zero period.
const MIN_KEEPALIVE: Duration = Duration::from_millis(100);

/// Events held back while waiting for `connected`; later ones are dropped.
const MAX_EARLY_EVENTS: usize = 256;

// ── Handle ───────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Connect(Identity),
    Subscribe(ThreadId),
    Unsubscribe(ThreadId),
    Disconnect,
    Subscriptions(oneshot::Sender<Vec<ThreadId>>),
}

/// Handle to a running channel manager.
///
/// Commands are queued in call order and never fail; events only ever
/// reach the caller through the [`Callbacks`] given to
/// [`spawn`](Self::spawn). Dropping the handle closes the transport and
/// stops the task.
#[derive(Debug)]
pub struct ChannelManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl ChannelManager {
    /// Spawn the manager task on the current tokio runtime. Does NOT
    /// connect -- call [`connect()`](Self::connect).
    pub fn spawn<C: Connector>(config: ChannelConfig, connector: C, callbacks: Callbacks) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelState::Idle);

        let task = ManagerTask {
            config,
            connector: Arc::new(connector),
            callbacks,
            state_tx,
            identity: None,
            subscriptions: SubscriptionSet::new(),
            phase: Phase::Idle,
        };

        Self {
            commands,
            state,
            task: tokio::spawn(task.run(command_rx)),
        }
    }

    /// Open the channel as `identity`. No-op while connecting or open.
    pub fn connect(&self, identity: Identity) {
        self.send(Command::Connect(identity));
    }

    /// Add a thread to the subscription set, announcing it right away if
    /// the channel is open and otherwise on the next connect.
    pub fn subscribe(&self, thread_id: ThreadId) {
        self.send(Command::Subscribe(thread_id));
    }

    /// Remove a thread from the subscription set.
    pub fn unsubscribe(&self, thread_id: ThreadId) {
        self.send(Command::Unsubscribe(thread_id));
    }

    /// Close the channel deliberately. Pending reconnects are cancelled;
    /// the subscription set is kept for the next `connect`.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Snapshot of the subscription set, in replay order.
    pub async fn subscriptions(&self) -> Result<Vec<ThreadId>, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscriptions(tx))
            .map_err(|_| CoreError::ManagerStopped)?;
        rx.await.map_err(|_| CoreError::ManagerStopped)
    }

    /// Wait until the channel is open, or fail once it reaches a terminal
    /// state or `timeout` elapses.
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.state.clone();
        let state = match tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.is_open() || s.is_terminal()),
        )
        .await
        {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(CoreError::ManagerStopped),
            Err(_) => {
                return Err(CoreError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        match state {
            ChannelState::Open => Ok(()),
            ChannelState::Rejected { reason } => Err(CoreError::AuthenticationRejected {
                reason: reason.to_string(),
            }),
            ChannelState::Failed { attempts } => Err(CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("gave up after {attempts} attempts"),
            }),
            other => Err(CoreError::Internal(format!("unexpected state {other}"))),
        }
    }

    /// Disconnect and wait for the manager task to finish.
    pub async fn shutdown(self) -> Result<(), CoreError> {
        let Self { commands, task, .. } = self;
        let _ = commands.send(Command::Disconnect);
        drop(commands);
        task.await
            .map_err(|e| CoreError::Internal(format!("channel manager task failed: {e}")))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("channel manager has stopped; command dropped");
        }
    }
}

// ── Manager task ─────────────────────────────────────────────────

/// What the task is doing, together with the resources that belong to
/// that phase. At most one transport exists because only one phase does.
enum Phase {
    Idle,
    /// Transport being established.
    Dialing {
        attempt: u32,
        pending: JoinHandle<Result<Connection, carelink_api::Error>>,
    },
    /// Transport up; waiting for the server's `connected`.
    /// Transport is up; events that beat the `connected` ack wait in
    /// `early` until subscriptions have been replayed.
    AwaitingAck {
        attempt: u32,
        conn: Connection,
        early: Vec<ServerEvent>,
    },
    Open {
        conn: Connection,
        keepalive: Interval,
        pong_deadline: Option<Instant>,
    },
    Closing { conn: Connection, deadline: Instant },
    ReconnectWait { attempt: u32, until: Instant },
}

/// Why the task woke up.
enum Wake {
    Command(Option<Command>),
    Dialed(Result<Connection, carelink_api::Error>),
    Frame(Option<Incoming>),
    KeepAlive,
    PongMissed,
    CloseTimeout,
    RetryDue,
}

impl Phase {
    /// Wait for whatever the current phase is waiting for. Every branch is
    /// cancel-safe: a command arriving first simply drops this future.
    async fn next_wake(&mut self) -> Wake {
        match self {
            Self::Idle => std::future::pending().await,
            Self::Dialing { pending, .. } => Wake::Dialed(match pending.await {
                Ok(result) => result,
                Err(e) => Err(carelink_api::Error::WebSocketConnect(format!(
                    "connection task failed: {e}"
                ))),
            }),
            Self::AwaitingAck { conn, .. } => Wake::Frame(conn.recv().await),
            Self::Open {
                conn,
                keepalive,
                pong_deadline,
            } => {
                tokio::select! {
                    frame = conn.recv() => Wake::Frame(frame),
                    () = sleep_until_opt(*pong_deadline) => Wake::PongMissed,
                    _ = keepalive.tick() => Wake::KeepAlive,
                }
            }
            Self::Closing { conn, deadline } => {
                tokio::select! {
                    frame = conn.recv() => Wake::Frame(frame),
                    () = tokio::time::sleep_until(*deadline) => Wake::CloseTimeout,
                }
            }
            Self::ReconnectWait { until, .. } => {
                tokio::time::sleep_until(*until).await;
                Wake::RetryDue
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct ManagerTask {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    callbacks: Callbacks,
    state_tx: watch::Sender<ChannelState>,
    identity: Option<Identity>,
    subscriptions: SubscriptionSet,
    phase: Phase,
}

impl ManagerTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = tokio::select! {
                biased;
                command = commands.recv() => Wake::Command(command),
                wake = self.phase.next_wake() => wake,
            };

            match wake {
                Wake::Command(Some(command)) => self.on_command(command),
                Wake::Command(None) => break,
                Wake::Dialed(result) => self.on_dialed(result),
                Wake::Frame(Some(Incoming::Text(text))) => self.on_text(&text),
                Wake::Frame(Some(Incoming::Closed(info))) => self.on_closed(&info),
                Wake::Frame(None) => self.on_closed(&CloseInfo::abnormal("transport dropped")),
                Wake::KeepAlive => self.on_keepalive(),
                Wake::PongMissed => self.on_pong_missed(),
                Wake::CloseTimeout => {
                    debug!("server did not confirm close in time");
                    self.finish_close();
                }
                Wake::RetryDue => self.on_retry_due(),
            }
        }

        self.release();
        debug!("channel manager task exiting");
    }

    // ── Commands ─────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect(identity) => self.on_connect(identity),
            Command::Subscribe(thread_id) => {
                if !self.subscriptions.insert(thread_id) {
                    debug!(thread_id, "already subscribed");
                    return;
                }
                if let Phase::Open { conn, .. } = &self.phase {
                    send_or_log(conn, &ClientMessage::SubscribeThread { thread_id });
                }
            }
            Command::Unsubscribe(thread_id) => {
                if !self.subscriptions.remove(thread_id) {
                    debug!(thread_id, "not subscribed");
                    return;
                }
                if let Phase::Open { conn, .. } = &self.phase {
                    send_or_log(conn, &ClientMessage::UnsubscribeThread { thread_id });
                }
            }
            Command::Disconnect => self.on_disconnect(),
            Command::Subscriptions(reply) => {
                let _ = reply.send(self.subscriptions.to_vec());
            }
        }
    }

    fn on_connect(&mut self, identity: Identity) {
        match self.phase {
            Phase::Dialing { .. } | Phase::AwaitingAck { .. } | Phase::Open { .. } => {
                if self.identity.as_ref().is_some_and(|current| !current.same_principal(&identity)) {
                    warn!(
                        tenant_id = %identity.tenant_id,
                        user_id = %identity.user_id,
                        "connect with a different identity ignored; disconnect first"
                    );
                } else {
                    debug!("connect ignored: already connecting or open");
                }
            }
            Phase::Idle | Phase::Closing { .. } | Phase::ReconnectWait { .. } => {
                // Closing transports are abandoned; the new attempt replaces them.
                self.release();
                self.identity = Some(identity);
                self.start_attempt(0);
            }
        }
    }

    fn on_disconnect(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::AwaitingAck { conn, .. } | Phase::Open { conn, .. } => {
                conn.close();
                self.phase = Phase::Closing {
                    conn,
                    deadline: Instant::now() + self.config.close_timeout,
                };
                self.publish(ChannelState::Closing);
            }
            Phase::Dialing { pending, .. } => {
                pending.abort();
                self.publish(ChannelState::Idle);
            }
            Phase::ReconnectWait { .. } => {
                debug!("pending reconnect cancelled");
                self.publish(ChannelState::Idle);
            }
            closing @ Phase::Closing { .. } => self.phase = closing,
            Phase::Idle => {}
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    fn start_attempt(&mut self, attempt: u32) {
        let Some(identity) = self.identity.as_ref() else {
            warn!("no identity to connect with");
            self.publish(ChannelState::Idle);
            return;
        };

        let url = identity.channel_url(&self.config.endpoint);
        info!(url = %redact_url(&url), attempt, "connecting to realtime channel");

        let pending = tokio::spawn(self.connector.connect(url));
        self.phase = Phase::Dialing { attempt, pending };
        self.publish(ChannelState::Connecting { attempt });
    }

    fn on_dialed(&mut self, result: Result<Connection, carelink_api::Error>) {
        let Phase::Dialing { attempt, .. } = self.phase else {
            return;
        };

        match result {
            Ok(conn) => {
                debug!(attempt, "transport established, awaiting acknowledgement");
                self.phase = Phase::AwaitingAck {
                    attempt,
                    conn,
                    early: Vec::new(),
                };
            }
            Err(e) if e.is_auth_rejection() => {
                if let carelink_api::Error::HandshakeRejected { status } = e {
                    self.reject(RejectReason::HttpStatus(status));
                }
            }
            Err(e) => {
                let transient = e.is_transient();
                let err = CoreError::from(e);
                warn!(error = %err, attempt, transient, "connection attempt failed");
                self.schedule_reconnect(attempt);
            }
        }
    }

    /// The server acknowledged the connection: replay subscriptions, arm
    /// the keep-alive and publish `Open`, then deliver anything that arrived
    /// ahead of the ack. Replay completes before any event of this
    /// connection reaches a callback.
    fn on_connected(&mut self) {
        let (conn, early) = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::AwaitingAck { conn, early, .. } => (conn, early),
            other => {
                debug!("duplicate connected acknowledgement ignored");
                self.phase = other;
                return;
            }
        };

        for thread_id in self.subscriptions.iter() {
            send_or_log(&conn, &ClientMessage::SubscribeThread { thread_id });
        }

        let period = self.config.keepalive_interval.max(MIN_KEEPALIVE);
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.phase = Phase::Open {
            conn,
            keepalive,
            pong_deadline: None,
        };
        info!(subscriptions = self.subscriptions.len(), "realtime channel open");
        self.publish(ChannelState::Open);

        for event in early {
            self.dispatch(event);
        }
    }

    fn on_closed(&mut self, info: &CloseInfo) {
        let attempt = match self.phase {
            Phase::Closing { .. } => {
                debug!(code = info.effective_code(), "transport closed");
                self.finish_close();
                return;
            }
            Phase::AwaitingAck { attempt, .. } => attempt,
            Phase::Open { .. } => 0,
            Phase::Idle | Phase::Dialing { .. } | Phase::ReconnectWait { .. } => return,
        };

        let code = info.effective_code();
        if self.config.is_auth_close_code(code) {
            self.reject(RejectReason::CloseCode(code));
            return;
        }

        warn!(code, reason = %info.reason, "realtime channel lost");
        self.schedule_reconnect(attempt);
    }

    fn finish_close(&mut self) {
        self.release();
        info!("realtime channel disconnected");
        self.publish(ChannelState::Idle);
    }

    fn reject(&mut self, reason: RejectReason) {
        self.release();
        error!(%reason, "authentication rejected, not reconnecting");
        self.publish(ChannelState::Rejected { reason });
    }

    fn schedule_reconnect(&mut self, failed_attempt: u32) {
        self.release();

        let reconnect = &self.config.reconnect;
        if let Some(max) = reconnect.max_retries {
            if failed_attempt >= max {
                error!(max_retries = max, "reconnection limit reached, giving up");
                self.publish(ChannelState::Failed {
                    attempts: failed_attempt.saturating_add(1),
                });
                return;
            }
        }

        let delay = calculate_backoff(failed_attempt, reconnect);
        let attempt = failed_attempt.saturating_add(1);
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt, "waiting before reconnect"
        );

        self.phase = Phase::ReconnectWait {
            attempt,
            until: Instant::now() + delay,
        };
        self.publish(ChannelState::ReconnectWait { attempt, delay });
    }

    fn on_retry_due(&mut self) {
        if let Phase::ReconnectWait { attempt, .. } = self.phase {
            self.start_attempt(attempt);
        }
    }

    // ── Keep-alive ───────────────────────────────────────────────

    fn on_keepalive(&mut self) {
        let Phase::Open {
            conn,
            pong_deadline,
            ..
        } = &mut self.phase
        else {
            return;
        };

        trace!("ping");
        send_or_log(conn, &ClientMessage::Ping);

        if pong_deadline.is_none() {
            *pong_deadline = self.config.pong_timeout.map(|t| Instant::now() + t);
        }
    }

    fn on_pong_missed(&mut self) {
        warn!(
            timeout_ms = self
                .config
                .pong_timeout
                .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            "no pong received, treating connection as lost"
        );
        self.schedule_reconnect(0);
    }

    // ── Dispatch ─────────────────────────────────────────────────

    fn on_text(&mut self, text: &str) {
        if matches!(self.phase, Phase::Closing { .. }) {
            trace!("frame received while closing, dropped");
            return;
        }

        match decode_event(text) {
            Ok(event) => {
                if let Phase::AwaitingAck { early, .. } = &mut self.phase {
                    if !matches!(event, ServerEvent::Connected(_)) {
                        if early.len() < MAX_EARLY_EVENTS {
                            trace!(kind = event.kind(), "event before acknowledgement held back");
                            early.push(event);
                        } else {
                            warn!(kind = event.kind(), "too many events before acknowledgement, dropped");
                        }
                        return;
                    }
                }
                self.dispatch(event);
            }
            Err(e) if e.is_unknown_type() => debug!(error = %e, "ignoring event"),
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        trace!(kind = event.kind(), "dispatching event");
        match event {
            ServerEvent::Connected(ack) => {
                debug!(message = ack.message.as_deref().unwrap_or(""), "server acknowledged connection");
                self.on_connected();
            }
            ServerEvent::Pong => {
                trace!("pong");
                if let Phase::Open { pong_deadline, .. } = &mut self.phase {
                    *pong_deadline = None;
                }
            }
            ServerEvent::NewMessage { message } => self.callbacks.new_message(message),
            ServerEvent::MessageRead {
                thread_id,
                message_id,
            } => self.callbacks.message_read(thread_id, message_id),
            ServerEvent::ThreadUpdate { thread_id, thread } => {
                self.callbacks.thread_update(thread_id, thread);
            }
            ServerEvent::Subscribed { thread_id } => debug!(?thread_id, "subscription confirmed"),
            ServerEvent::Unsubscribed { thread_id } => {
                debug!(?thread_id, "unsubscription confirmed");
            }
            ServerEvent::Error { message } => {
                warn!(%message, "server reported an error");
                self.callbacks.error(message);
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Drop whatever the current phase owns: abort a pending dial, close
    /// an open transport. Leaves the phase `Idle`.
    fn release(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Dialing { pending, .. } => pending.abort(),
            Phase::AwaitingAck { conn, .. } | Phase::Open { conn, .. } | Phase::Closing { conn, .. } => {
                conn.close();
            }
            Phase::Idle | Phase::ReconnectWait { .. } => {}
        }
    }

    fn publish(&self, state: ChannelState) {
        debug!(state = state.label(), "channel state changed");
        self.state_tx.send_replace(state);
    }
}

fn send_or_log(conn: &Connection, message: &ClientMessage) {
    if let Err(e) = conn.send(message) {
        debug!(error = %e, ?message, "outbound frame not queued");
    }
}

//! Connection lifecycle: one live transport at a time, reconnects, and
//! protection against overlapping or superseded attempts.
//!
//! The manager never blocks and never spawns anything itself. Transports and
//! timers report back through the client's event queue, and the client feeds
//! those events into [`LifecycleManager::handle_transport`] and
//! [`LifecycleManager::handle_reconnect_due`] one at a time.

use alerta_shared::{Subject, CLOSE_ABNORMAL, CLOSE_NORMAL};

use super::connection::{
    AttemptId, ConnectionFactory, ConnectionState, Connector, EventSink, ReconnectConfig,
    Scheduler, TransportEvent, TransportHandle,
};

struct LiveTransport<H> {
    attempt: AttemptId,
    handle: H,
    opened: bool,
}

pub struct LifecycleManager<C: Connector, S: Scheduler> {
    factory: ConnectionFactory<C>,
    scheduler: S,
    sink: EventSink,
    reconnect: ReconnectConfig,
    subject: Option<Subject>,
    state: ConnectionState,
    live: Option<LiveTransport<C::Handle>>,
    /// Set from `connect()` until the attempt opens, errors or closes.
    attempt_in_progress: bool,
    /// The only attempt whose events are still acted on.
    current_attempt: Option<AttemptId>,
    next_attempt: u64,
    manual_close: bool,
    pending_reconnect: Option<u64>,
    next_ticket: u64,
    /// Reconnects since the last successful open.
    failed_attempts: u32,
    /// Whether any attempt for the current subject ever reached Open.
    session_opened: bool,
}

impl<C: Connector, S: Scheduler> LifecycleManager<C, S> {
    pub fn new(
        factory: ConnectionFactory<C>,
        scheduler: S,
        sink: EventSink,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            factory,
            scheduler,
            sink,
            reconnect,
            subject: None,
            state: ConnectionState::Idle,
            live: None,
            attempt_in_progress: false,
            current_attempt: None,
            next_attempt: 0,
            manual_close: false,
            pending_reconnect: None,
            next_ticket: 0,
            failed_attempts: 0,
            session_opened: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn pending_reconnect(&self) -> Option<u64> {
        self.pending_reconnect
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.current_attempt
    }

    /// Replace the subject future attempts connect as. Does not touch the
    /// live transport; callers disconnect first when the subject changes.
    pub fn set_subject(&mut self, subject: Option<Subject>) {
        if self.subject != subject {
            self.session_opened = false;
        }
        self.subject = subject;
    }

    /// Start a connection attempt. Returns whether a transport was created.
    ///
    /// No-op while another attempt is in flight or a transport is live, so
    /// calling it twice in a row (double mount) yields one connection.
    pub fn connect(&mut self) -> bool {
        let Some(subject) = self.subject.clone() else {
            crate::log_warn!("Cannot connect: user id or credential missing");
            return false;
        };

        if self.attempt_in_progress {
            crate::log_warn!("A connection attempt is already in progress, skipping");
            return false;
        }

        if let Some(live) = &self.live {
            crate::log_warn!("Already connected or connecting [{}]", live.attempt);
            return false;
        }

        self.cancel_pending_reconnect();
        self.manual_close = false;
        self.attempt_in_progress = true;
        self.next_attempt += 1;
        let attempt = AttemptId(self.next_attempt);
        self.current_attempt = Some(attempt);
        self.state = ConnectionState::Connecting;

        crate::log_info!("Connecting to {} [{}]...", self.factory.endpoint(), attempt);

        match self.factory.open(&subject, attempt, self.sink.clone()) {
            Ok(handle) => {
                self.live = Some(LiveTransport {
                    attempt,
                    handle,
                    opened: false,
                });
                true
            }
            Err(e) => {
                crate::log_error!("Could not create transport [{}]: {}", attempt, e);
                self.attempt_in_progress = false;
                self.current_attempt = None;
                self.state = ConnectionState::Closed;
                if e.is_retriable() {
                    self.schedule_reconnect();
                }
                false
            }
        }
    }

    /// Tear down on purpose: no reconnect happens until `connect()` is
    /// called again. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        let had_work = self.live.is_some() || self.pending_reconnect.is_some();

        self.manual_close = true;
        self.attempt_in_progress = false;
        self.current_attempt = None;
        self.cancel_pending_reconnect();

        if let Some(mut live) = self.live.take() {
            live.handle.close(CLOSE_NORMAL, "Logout");
        }

        self.failed_attempts = 0;
        self.state = ConnectionState::Idle;

        if had_work {
            crate::log_info!("Disconnected");
        }
    }

    /// Apply a transport event. Returns the raw text of an inbound message
    /// that should be normalized and stored.
    pub fn handle_transport(&mut self, attempt: AttemptId, event: TransportEvent) -> Option<String> {
        if self.current_attempt != Some(attempt) {
            match event {
                TransportEvent::Opened => {
                    crate::log_warn!("Stale connection [{}] opened, discarding", attempt)
                }
                _ => crate::log_debug!("Ignoring event from stale connection [{}]", attempt),
            }
            return None;
        }

        match event {
            TransportEvent::Opened => {
                self.on_opened(attempt);
                None
            }
            TransportEvent::Message(text) => Some(text),
            TransportEvent::Error(reason) => {
                if self.attempt_in_progress {
                    crate::log_error!("WebSocket error [{}]: {}", attempt, reason);
                } else {
                    crate::log_warn!("WebSocket error [{}]: {}", attempt, reason);
                }
                self.attempt_in_progress = false;
                None
            }
            TransportEvent::Closed { code, reason } => {
                self.on_closed(attempt, code, &reason);
                None
            }
        }
    }

    /// A reconnect timer fired. Outdated tickets are ignored.
    pub fn handle_reconnect_due(&mut self, ticket: u64) {
        if self.pending_reconnect != Some(ticket) {
            crate::log_debug!("Ignoring outdated reconnect timer {}", ticket);
            return;
        }
        self.pending_reconnect = None;
        self.failed_attempts += 1;
        crate::log_info!("Reconnecting (attempt {})", self.failed_attempts);
        self.connect();
    }

    fn on_opened(&mut self, attempt: AttemptId) {
        crate::log_info!("WebSocket connected [{}]", attempt);
        self.state = ConnectionState::Open;
        self.attempt_in_progress = false;
        self.failed_attempts = 0;
        self.session_opened = true;
        if let Some(live) = self.live.as_mut() {
            live.opened = true;
        }
        self.cancel_pending_reconnect();
    }

    fn on_closed(&mut self, attempt: AttemptId, code: u16, reason: &str) {
        let opened = self
            .live
            .take()
            .map(|live| live.opened)
            .unwrap_or(false);

        match code {
            CLOSE_NORMAL => crate::log_info!("Connection closed normally [{}]", attempt),
            CLOSE_ABNORMAL => crate::log_warn!("Connection closed abnormally [{}]", attempt),
            _ => crate::log_info!(
                "Connection closed [{}]: {} - {}",
                attempt,
                code,
                if reason.is_empty() { "no reason" } else { reason }
            ),
        }

        self.attempt_in_progress = false;
        self.current_attempt = None;
        self.state = ConnectionState::Closed;

        if self.manual_close {
            crate::log_info!("Manual close, not reconnecting");
            return;
        }

        if code == CLOSE_NORMAL {
            return;
        }

        // Never got through for this subject: the endpoint is down or refuses
        // us. Retrying would only spin against it.
        if code == CLOSE_ABNORMAL && !opened && !self.session_opened {
            crate::log_warn!("Endpoint never accepted the connection, not reconnecting");
            return;
        }

        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.subject.is_none() {
            return;
        }

        if self.reconnect.exhausted(self.failed_attempts) {
            crate::log_error!(
                "Max reconnect attempts ({}) exceeded",
                self.reconnect.max_attempts
            );
            return;
        }

        self.cancel_pending_reconnect();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.reconnect.delay(self.failed_attempts);
        crate::log_info!("Reconnecting in {}ms", delay.as_millis());
        self.scheduler.schedule(delay, ticket, self.sink.clone());
        self.pending_reconnect = Some(ticket);
    }

    fn cancel_pending_reconnect(&mut self) {
        if let Some(ticket) = self.pending_reconnect.take() {
            self.scheduler.cancel(ticket);
        }
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> EventSink {
        self.sink.clone()
    }
}

impl<C: Connector, S: Scheduler> Drop for LifecycleManager<C, S> {
    fn drop(&mut self) {
        if self.live.is_some() || self.pending_reconnect.is_some() {
            self.disconnect();
        }
    }
}

//! Connection plumbing shared by every platform: state, reconnect policy,
//! the event queue transports report into, and the connector/scheduler seams.
//!
//! This module provides the shared types and conditionally includes
//! the platform-specific implementation.

use std::time::Duration;

use alerta_shared::{connect_url, NotifyError, Subject};
use futures_channel::mpsc::UnboundedSender;
use url::Url;

/// Connection state of a notification client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing running and nothing scheduled, either never connected or
    /// torn down on purpose.
    #[default]
    Idle,
    Connecting,
    Open,
    /// Lost or refused; a reconnect may be pending.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// A physical connection exists (or is being established).
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff (1.0 = fixed delay)
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(3000)
    }
}

impl ReconnectConfig {
    /// Same delay before every attempt, retrying forever.
    pub fn fixed(delay_ms: u32) -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: delay_ms,
            max_delay_ms: delay_ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_for_attempt(attempt) as u64)
    }

    /// Whether `attempts` failed attempts already used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }
}

/// Identifies one connection attempt. Minted in increasing order, so the
/// most recent attempt always has the largest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub(crate) u64);

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a transport reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Everything the client's event loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Transport {
        attempt: AttemptId,
        event: TransportEvent,
    },
    ReconnectDue {
        ticket: u64,
    },
}

/// Write end of the client's event queue, handed to transports and timers.
#[derive(Clone)]
pub struct EventSink {
    tx: UnboundedSender<DriverEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<DriverEvent>) -> Self {
        Self { tx }
    }

    /// Returns false once the client is gone.
    pub fn transport(&self, attempt: AttemptId, event: TransportEvent) -> bool {
        self.tx
            .unbounded_send(DriverEvent::Transport { attempt, event })
            .is_ok()
    }

    pub fn reconnect_due(&self, ticket: u64) -> bool {
        self.tx
            .unbounded_send(DriverEvent::ReconnectDue { ticket })
            .is_ok()
    }
}

/// A live transport. Dropping it must not deliver further events.
pub trait TransportHandle {
    fn close(&mut self, code: u16, reason: &str);
}

/// Opens transports. Progress (open, messages, close) is reported through
/// the sink, tagged with `attempt`.
pub trait Connector {
    type Handle: TransportHandle;

    fn open(
        &mut self,
        url: &Url,
        attempt: AttemptId,
        sink: EventSink,
    ) -> Result<Self::Handle, NotifyError>;
}

/// One-shot timers for reconnects. A fired timer posts
/// [`DriverEvent::ReconnectDue`] with its ticket.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, ticket: u64, sink: EventSink);
    fn cancel(&mut self, ticket: u64);
}

/// Pairs the push endpoint with a platform connector.
pub struct ConnectionFactory<C> {
    endpoint: Url,
    connector: C,
}

impl<C: Connector> ConnectionFactory<C> {
    pub fn new(endpoint: Url, connector: C) -> Self {
        Self {
            endpoint,
            connector,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Open a transport for `subject`. The credential only travels in the
    /// request URL; it is never logged.
    pub fn open(
        &mut self,
        subject: &Subject,
        attempt: AttemptId,
        sink: EventSink,
    ) -> Result<C::Handle, NotifyError> {
        let url = connect_url(&self.endpoint, subject)?;
        crate::log_debug!(
            "Opening {} for user {} ({}) [{}]",
            self.endpoint,
            subject.user_id,
            subject.role,
            attempt
        );
        self.connector.open(&url, attempt, sink)
    }

    #[cfg(test)]
    pub(crate) fn connector(&self) -> &C {
        &self.connector
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::{BrowserConnector, BrowserHandle, BrowserScheduler};
#[cfg(target_arch = "wasm32")]
pub type PlatformConnector = BrowserConnector;
#[cfg(target_arch = "wasm32")]
pub type PlatformScheduler = BrowserScheduler;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::{TokioScheduler, TungsteniteConnector, TungsteniteHandle};
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformConnector = TungsteniteConnector;
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformScheduler = TokioScheduler;

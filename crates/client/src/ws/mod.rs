//! WebSocket module for the real-time notification feed.
//!
//! This module provides:
//! - Connection lifecycle with auto-reconnect and stale-attempt protection
//! - Platform transports (tokio-tungstenite natively, `web_sys` in the browser)
//! - Dioxus hooks that mirror the client into signals
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────┐   ┌────────────┐
//!   │ transport  │   │   timer    │   (tokio task / browser callback)
//!   └────────────┘   └────────────┘
//!          │                │
//!          └───────┬────────┘
//!                  ▼   DriverEvent
//!        ┌─────────────────────┐
//!        │     event queue     │
//!        └─────────────────────┘
//!                  │   NotificationClient::run
//!                  ▼
//!        ┌─────────────────────┐     ┌──────────────────┐
//!        │  LifecycleManager   │ ──▶ │    normalize()   │
//!        └─────────────────────┘     └──────────────────┘
//!                                              │
//!                                              ▼
//!                                   ┌──────────────────┐
//!                                   │ NotificationStore│
//!                                   └──────────────────┘
//!                                              │
//!                          callbacks / listeners / signals
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! fn Bell() -> Element {
//!     let session = use_context::<Signal<Identity>>();
//!     let feed = use_notifications(ClientConfig::default(), session);
//!     let unread = feed.unread_count();
//!
//!     rsx! {
//!         span { "🔔 {unread}" }
//!         for n in feed.notifications.read().iter() {
//!             div { "{n.kind.icon()} {n.title}: {n.message}" }
//!         }
//!     }
//! }
//! ```

mod connection;
mod hooks;
mod manager;

#[cfg(test)]
pub(crate) mod testing;

// Re-export connection types
pub use connection::{
    AttemptId, ConnectionFactory, ConnectionState, Connector, DriverEvent, EventSink,
    PlatformConnector, PlatformScheduler, ReconnectConfig, Scheduler, TransportEvent,
    TransportHandle,
};

#[cfg(target_arch = "wasm32")]
pub use connection::{BrowserConnector, BrowserHandle, BrowserScheduler};
#[cfg(not(target_arch = "wasm32"))]
pub use connection::{TokioScheduler, TungsteniteConnector, TungsteniteHandle};

pub use manager::LifecycleManager;

pub use hooks::{use_notifications, NotificationsHandle};

//! Alerta Client - real-time incident notifications
//!
//! This crate contains the notification client used by the web app and the
//! `alerta-listen` command-line tool: the connection lifecycle, the inbox,
//! platform transports and the Dioxus hooks built on top of them.

pub mod logging;

pub mod client;
pub mod config;
pub mod stores;
pub mod ws;

pub use client::{ClientChange, NotificationClient, PlatformClient, WeakClient};
pub use config::ClientConfig;
pub use stores::NotificationStore;
pub use ws::{use_notifications, ConnectionState, NotificationsHandle, ReconnectConfig};

pub use alerta_shared::{Identity, Notification, NotificationKind, Role};

//! Client-side state owned by the notification client.

pub mod notifications;

pub use notifications::NotificationStore;

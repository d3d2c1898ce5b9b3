//! API route handlers.

pub mod health;
pub mod notify;

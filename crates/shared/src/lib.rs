//! Shared types and utilities for the alerta notification client and push relay.

pub mod error;
pub mod models;
pub mod normalize;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use normalize::{normalize, normalize_at};
pub use protocol::*;

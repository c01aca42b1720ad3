//! API handlers and shared request utilities.

pub mod admin;
pub mod auth;
pub mod health;
pub mod me;
pub mod root;
pub mod types;
pub mod utils;

pub use utils::ClientOrigin;

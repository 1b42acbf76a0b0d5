//! Data models for the pickup backend

mod auth;
mod order;
mod user;

pub use auth::*;
pub use order::*;
pub use user::*;

//! Authentication for the pickup backend
//!
//! Phone number + one-time code login, the durable access/refresh token
//! store, and JWT expiry inspection.

pub mod login;
pub mod tokens;

pub use login::{login, logout, request_otp, status};
#[cfg(test)]
pub use tokens::{test_jwt, MemoryTokenStore};
pub use tokens::{CredentialPair, StoreError, StoredToken, TokenStore};

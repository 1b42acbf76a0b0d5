//! Failure taxonomy of the authenticated request pipeline

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Got a 401 and there is no refresh token to recover with.
    #[error("not signed in or session expired; run 'pickup-cli login'")]
    Unauthorized,

    /// The refresh call itself failed. Stored tokens have been cleared.
    #[error("session refresh failed ({reason}); run 'pickup-cli login'")]
    RefreshFailed {
        status: Option<StatusCode>,
        reason: String,
    },

    /// Any other HTTP or network failure, from the first attempt or the retry.
    #[error("{}", describe_request_failure(.url, .status, .body))]
    RequestFailed {
        url: String,
        status: Option<StatusCode>,
        body: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Whether the caller has to send the user back through login.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::RefreshFailed { .. })
    }
}

fn describe_request_failure(url: &str, status: &Option<StatusCode>, body: &str) -> String {
    match status {
        Some(status) => format!("HTTP {} for {}: {}", status.as_u16(), url, body),
        None => format!("request to {} failed: {}", url, body),
    }
}

//! Verification and token wire types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp_code: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<VerifyOtpData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh endpoint reply. The refresh token is only present when the
/// backend rotates it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

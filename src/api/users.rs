//! Verification and user profile endpoints

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

use super::client::ApiClient;
use super::endpoints::Endpoint;
use super::error::ApiError;
use super::transport::{RequestBody, Transport};
use crate::auth::{CredentialPair, TokenStore};
use crate::models::{
    PushTokenRequest, SaveUserRequest, SaveUserResponse, SendOtpRequest, SessionUser,
    UpdateUserNameRequest, VerifyOtpRequest, VerifyOtpResponse,
};

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    /// Ask the backend to text a one-time code to `phone`.
    pub async fn send_otp(&self, phone: &str) -> Result<()> {
        let body = SendOtpRequest {
            phone_number: phone.to_string(),
        };
        self.call_json(Endpoint::SendOtp, &[], &body)
            .await
            .context("Failed to request OTP")?;
        Ok(())
    }

    /// Exchange phone + code for a credential pair. Does not store it.
    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<CredentialPair> {
        let body = VerifyOtpRequest {
            phone_number: phone.to_string(),
            otp_code: code.to_string(),
        };
        let resp = self
            .call_json(Endpoint::VerifyOtp, &[], &body)
            .await
            .context("OTP verification failed")?;
        let parsed: VerifyOtpResponse = resp
            .json()
            .context("Failed to parse verify-otp response")?;

        let data = parsed.data;
        if !parsed.success {
            let message = data
                .and_then(|d| d.message)
                .or(parsed.message)
                .unwrap_or_else(|| "Invalid credentials. Please try again.".to_string());
            bail!("{}", message);
        }

        match data.map(|d| (d.access_token, d.refresh_token)) {
            Some((Some(access), Some(refresh))) if !access.is_empty() => {
                Ok(CredentialPair::new(access, refresh))
            }
            _ => bail!("verify-otp response is missing tokens"),
        }
    }

    /// Look up an existing account by phone. `None` means a new user.
    pub async fn find_user(&self, phone: &str) -> Result<Option<SessionUser>> {
        let lookup = self
            .call_json(
                Endpoint::FindUser,
                &[("number", phone.to_string())],
                &serde_json::json!({}),
            )
            .await;
        let resp = match lookup {
            Ok(resp) => resp,
            Err(ApiError::RequestFailed {
                status: Some(StatusCode::NOT_FOUND),
                ..
            }) => return Ok(None),
            Err(e) => return Err(e).context("User lookup failed"),
        };

        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: serde_json::Value = resp.json().context("Failed to parse user lookup")?;
        if value.get("userId").map_or(true, serde_json::Value::is_null) {
            return Ok(None);
        }
        let user = SessionUser::deserialize(value).context("Failed to parse user lookup")?;
        Ok(Some(user))
    }

    /// Register a first-time user.
    pub async fn save_user(&self, request: &SaveUserRequest) -> Result<SessionUser> {
        let resp = self
            .call_json(Endpoint::SaveUser, &[], request)
            .await
            .context("Failed to save user")?;
        let parsed: SaveUserResponse = resp.json().context("Failed to parse save-user response")?;
        parsed.user.context("save-user response has no user")
    }

    /// Profile of the signed-in user.
    pub async fn current_user(&self) -> Result<SessionUser> {
        let resp = self
            .call(Endpoint::CurrentUser, &[], RequestBody::Empty)
            .await
            .context("Failed to fetch current user")?;
        resp.json().context("Failed to parse /user/me response")
    }

    pub async fn update_user_name(&self, user_id: &str, name: &str) -> Result<()> {
        let body = UpdateUserNameRequest {
            user_id: user_id.to_string(),
            user_name: name.to_string(),
        };
        self.call_json(Endpoint::UpdateUserName, &[], &body)
            .await
            .context("Failed to update user name")?;
        Ok(())
    }

    /// Attach a device push token to the user server-side.
    pub async fn save_push_token(&self, user_id: &str, push_token: &str) -> Result<()> {
        let body = PushTokenRequest {
            push_token: push_token.to_string(),
            user_id: user_id.to_string(),
        };
        self.call_json(Endpoint::SavePushToken, &[], &body)
            .await
            .context("Failed to save push token")?;
        Ok(())
    }
}

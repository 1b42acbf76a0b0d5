//! OTP login flow, logout and auth status

use anyhow::{bail, Context, Result};

use super::{StoredToken, TokenStore};
use crate::api::transport::Transport;
use crate::api::ApiClient;
use crate::config::Config;
use crate::models::SaveUserRequest;
use crate::session::Session;

/// Ten digits, leading digit 6-9.
pub fn validate_phone(phone: &str) -> Result<()> {
    let valid = phone.len() == 10
        && phone.bytes().all(|b| b.is_ascii_digit())
        && matches!(phone.as_bytes().first().copied(), Some(b'6'..=b'9'));
    if !valid {
        bail!("Enter a valid 10-digit mobile number");
    }
    Ok(())
}

/// Verify the code, persist the tokens and establish the session user,
/// registering the account first if the backend does not know the number.
pub async fn sign_in<T: Transport, S: TokenStore>(
    client: &ApiClient<T, S>,
    user_role: &str,
    phone: &str,
    otp: &str,
    name: Option<&str>,
    push_token: Option<&str>,
) -> Result<Session> {
    validate_phone(phone)?;
    if otp.trim().is_empty() {
        bail!("OTP cannot be empty");
    }

    let pair = client.verify_otp(phone, otp.trim()).await?;
    client
        .store()
        .set_tokens(&pair.access_token, &pair.refresh_token)
        .context("Failed to store credentials")?;
    tracing::info!("OTP verified, credentials stored");

    // Only a definite "not found" registers a new account.
    let existing = client.find_user(phone).await?;

    let user = match existing {
        Some(user) => user,
        None => {
            let name = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .context("New account: a name is required (pass --name)")?;
            tracing::info!("Registering new user");
            client
                .save_user(&SaveUserRequest {
                    user_name: name.to_string(),
                    user_role: user_role.to_string(),
                    phone_number: phone.to_string(),
                })
                .await?
        }
    };

    if let Some(token) = push_token {
        if let Err(e) = client.save_push_token(&user.user_id, token).await {
            tracing::warn!("Failed to save device token: {:#}", e);
        }
    }

    let mut session = Session::default();
    session.begin(user);
    Ok(session)
}

/// Ask the backend to send a login code
pub async fn request_otp(phone: &str) -> Result<()> {
    validate_phone(phone)?;
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    client.send_otp(phone).await?;
    println!("OTP sent to {}.", phone);
    Ok(())
}

/// Perform the OTP login flow
pub async fn login(
    phone: &str,
    otp: &str,
    name: Option<&str>,
    push_token: Option<&str>,
) -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    let session = sign_in(&client, &config.user_role, phone, otp, name, push_token).await?;

    let user = session.require_user()?;
    println!("Login successful. Welcome, {}.", user.display_name());
    Ok(())
}

/// Clear stored credentials
pub async fn logout() -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    Session::default().end(&client)?;
    println!("Logged out.");
    Ok(())
}

fn describe(token: &StoredToken) -> String {
    let expiry = token
        .expires_at
        .and_then(|exp| chrono::DateTime::from_timestamp(exp as i64, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    let prefix: String = token.token.chars().take(8).collect();
    let state = match (token.is_expired(), expiry) {
        (true, Some(at)) => format!("expired (at {})", at),
        (false, Some(at)) => format!("valid (expires {})", at),
        (_, None) => "present (no expiry claim)".to_string(),
    };
    format!("{}... {}", prefix, state)
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    let store = client.store();

    println!("Backend:       {}", config.base_url);
    match store.get_access_token()? {
        Some(token) => println!("Access token:  {}", describe(&StoredToken::from_jwt(token))),
        None => println!("Access token:  none"),
    }
    match store.get_refresh_token()? {
        Some(token) => println!("Refresh token: {}", describe(&StoredToken::from_jwt(token))),
        None => println!("Refresh token: none"),
    }

    if store.get_credentials()?.is_none() {
        println!("\nRun 'pickup-cli login' to authenticate.");
    }
    Ok(())
}

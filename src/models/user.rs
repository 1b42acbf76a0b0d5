//! User-related models

use serde::{Deserialize, Deserializer, Serialize};

/// Signed-in user as returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub user_name: Option<String>,
    pub phone_number: Option<String>,
    pub user_role: Option<String>,
}

impl SessionUser {
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("(unnamed)")
    }
}

/// Ids arrive as strings from some endpoints and as integers from others.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Registration payload for a first-time user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveUserRequest {
    pub user_name: String,
    pub user_role: String,
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveUserResponse {
    pub user: Option<SessionUser>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserNameRequest {
    pub user_id: String,
    pub user_name: String,
}

/// Device push token registration
#[derive(Debug, Clone, Serialize)]
pub struct PushTokenRequest {
    #[serde(rename = "expoPushToken")]
    pub push_token: String,
    #[serde(rename = "UserId")]
    pub user_id: String,
}

//! Backend endpoint descriptors

use reqwest::Method;
use url::Url;

/// Every backend call the client makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    SendOtp,
    VerifyOtp,
    RefreshToken,
    FindUser,
    SaveUser,
    CurrentUser,
    UpdateUserName,
    SavePushToken,
    UploadImage,
    CreateOrder,
    OrderHistory,
}

impl Endpoint {
    pub fn method(self) -> Method {
        match self {
            Self::CurrentUser | Self::OrderHistory => Method::GET,
            Self::UpdateUserName => Method::PUT,
            _ => Method::POST,
        }
    }

    pub fn path(self) -> &'static str {
        // "Verfication" is how the backend spells it.
        match self {
            Self::SendOtp => "/api/Verfication/send-otp",
            Self::VerifyOtp => "/api/Verfication/verify-otp",
            Self::RefreshToken => "/api/Verfication/refresh-token",
            Self::FindUser => "/api/User",
            Self::SaveUser => "/api/User/save-user",
            Self::CurrentUser => "/api/user/me",
            Self::UpdateUserName => "/api/User/UpdateUserName",
            Self::SavePushToken => "/Notification/save-token",
            Self::UploadImage => "/OrderRequest/UploadImage",
            Self::CreateOrder => "/OrderRequest/create-order",
            Self::OrderHistory => "/OrderRequest/orders",
        }
    }

    /// Anonymous endpoints never carry a bearer token and never trigger a refresh.
    pub fn authenticated(self) -> bool {
        !matches!(self, Self::SendOtp | Self::VerifyOtp | Self::RefreshToken)
    }

    /// Absolute URL for this endpoint under `base`, with query pairs encoded.
    pub fn url(self, base: &str, query: &[(&str, String)]) -> Result<String, url::ParseError> {
        let joined = format!("{}{}", base.trim_end_matches('/'), self.path());
        let url = if query.is_empty() {
            Url::parse(&joined)?
        } else {
            Url::parse_with_params(&joined, query.iter().map(|(k, v)| (*k, v.as_str())))?
        };
        Ok(url.into())
    }
}

//! Token storage and expiry inspection

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;

/// Seconds of slack before `exp` at which a token already counts as expired.
const EXPIRY_SKEW_SECS: u64 = 30;

/// Access/refresh bearer pair as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// A bearer token together with the expiry read from its JWT payload.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    /// Wrap an opaque token, reading `exp` if it happens to be a JWT.
    pub fn from_jwt(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token);
        Self { token, expires_at }
    }

    /// Opaque tokens (no readable `exp`) never count as expired here; the
    /// server's 401 is the authority for those.
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.is_expired_at(now)
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(exp) => now + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }
}

/// Read the `exp` claim of a JWT without verifying its signature.
pub fn jwt_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_f64()?;
    (exp >= 0.0).then_some(exp as u64)
}

/// Failure talking to the durable token storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine credential storage location")]
    Location,
    #[error("credential storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file is corrupt: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable holder of the access/refresh pair.
///
/// `set_tokens` must make both values visible together: a reader sees either
/// the old pair or the new one, never a mix.
pub trait TokenStore {
    fn get_access_token(&self) -> Result<Option<String>, StoreError>;
    fn get_refresh_token(&self) -> Result<Option<String>, StoreError>;
    fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError>;
    fn clear_tokens(&self) -> Result<(), StoreError>;

    fn get_credentials(&self) -> Result<Option<CredentialPair>, StoreError> {
        match (self.get_access_token()?, self.get_refresh_token()?) {
            (Some(access), Some(refresh)) => Ok(Some(CredentialPair::new(access, refresh))),
            _ => Ok(None),
        }
    }
}

/// In-process store used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: std::sync::Mutex<(Option<String>, Option<String>)>,
    pub writes: std::sync::atomic::AtomicUsize,
    /// Make `clear_tokens` fail, as a read-only credentials file would.
    pub fail_clear: bool,
}

#[cfg(test)]
impl MemoryTokenStore {
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        Self {
            inner: std::sync::Mutex::new((access.map(String::from), refresh.map(String::from))),
            writes: Default::default(),
            fail_clear: false,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TokenStore for MemoryTokenStore {
    fn get_access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().0.clone())
    }

    fn get_refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().1.clone())
    }

    fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        *self.inner.lock().unwrap() = (Some(access.to_string()), Some(refresh.to_string()));
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), StoreError> {
        if self.fail_clear {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only store",
            )));
        }
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        *self.inner.lock().unwrap() = (None, None);
        Ok(())
    }
}

/// Build an unsigned JWT carrying only `exp`, for tests.
#[cfg(test)]
pub fn test_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, exp));
    format!("{}.{}.sig", header, payload)
}

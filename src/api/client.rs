//! Authenticated HTTP client for the pickup backend
//!
//! Attaches the stored access token to every authenticated call. On a 401 it
//! exchanges the refresh token once and retries the original request once
//! with the new token. Refreshes are single-flight: callers that hit a 401
//! while another caller is refreshing wait for it and reuse its token.

use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::Mutex;

use super::endpoints::Endpoint;
use super::error::ApiError;
use super::transport::{ApiResponse, HttpTransport, RequestBody, RequestSpec, Transport};
use crate::auth::{StoredToken, TokenStore};
use crate::config::{Config, FileTokenStore};
use crate::models::{RefreshRequest, RefreshResponse};

/// Request pipeline over a transport and a token store.
pub struct ApiClient<T = HttpTransport, S = FileTokenStore> {
    transport: T,
    store: S,
    base_url: String,
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    /// reqwest transport plus the on-disk token store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            HttpTransport::new(),
            FileTokenStore::open_default()?,
            &config.base_url,
        ))
    }
}

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    pub fn new(transport: T, store: S, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            store,
            base_url: base_url.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Descriptor for `endpoint` with an empty body.
    pub fn request(
        &self,
        endpoint: Endpoint,
        query: &[(&str, String)],
    ) -> Result<RequestSpec, ApiError> {
        let url = endpoint
            .url(&self.base_url, query)
            .map_err(|e| ApiError::RequestFailed {
                url: format!("{}{}", self.base_url, endpoint.path()),
                status: None,
                body: format!("invalid URL: {}", e),
            })?;
        Ok(RequestSpec::new(endpoint.method(), url))
    }

    /// Call `endpoint`, going through the refresh pipeline if it is authenticated.
    pub async fn call(
        &self,
        endpoint: Endpoint,
        query: &[(&str, String)],
        body: RequestBody,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.request(endpoint, query)?.with_body(body);
        if endpoint.authenticated() {
            self.execute(request).await
        } else {
            self.execute_anonymous(request).await
        }
    }

    /// `call` with a JSON body.
    pub async fn call_json<B: Serialize>(
        &self,
        endpoint: Endpoint,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::RequestFailed {
            url: endpoint.path().to_string(),
            status: None,
            body: format!("failed to encode request body: {}", e),
        })?;
        self.call(endpoint, query, RequestBody::Json(value)).await
    }

    /// Send with the stored bearer token; on 401 refresh once and retry once.
    pub async fn execute(&self, request: RequestSpec) -> Result<ApiResponse, ApiError> {
        let token = self.store.get_access_token()?;
        let resp = self.send(&request.authorized(token.as_deref())).await?;
        if resp.status != StatusCode::UNAUTHORIZED {
            return check_status(resp, &request.url);
        }

        tracing::debug!("401 from {}, refreshing session", request.url);
        let fresh = self.refresh_after_rejection(token.as_deref()).await?;

        let retry = self.send(&request.authorized(Some(&fresh))).await?;
        check_status(retry, &request.url)
    }

    /// Send without any bearer token and without refresh handling.
    pub async fn execute_anonymous(&self, request: RequestSpec) -> Result<ApiResponse, ApiError> {
        let resp = self.send(&request.authorized(None)).await?;
        check_status(resp, &request.url)
    }

    /// Refresh ahead of time when the stored access token is missing or its
    /// JWT `exp` has passed. Opaque access tokens are left to the 401 path.
    pub async fn ensure_fresh(&self) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let stale = match self.store.get_access_token()? {
            Some(token) => StoredToken::from_jwt(token).is_expired(),
            None => true,
        };
        if !stale {
            return Ok(());
        }

        let refresh_expired = self
            .store
            .get_refresh_token()?
            .is_some_and(|rt| StoredToken::from_jwt(rt).is_expired());
        if refresh_expired {
            tracing::info!("Refresh token expired, clearing session");
            self.store.clear_tokens()?;
            return Err(ApiError::Unauthorized);
        }

        tracing::info!("Access token missing or expired, refreshing...");
        self.refresh_locked().await.map(|_| ())
    }

    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, ApiError> {
        tracing::debug!("{} {}", request.method, request.url);
        self.transport
            .send(request)
            .await
            .map_err(|e| ApiError::RequestFailed {
                url: request.url.clone(),
                status: None,
                body: e.to_string(),
            })
    }

    /// Serialize refreshes. A caller that queued behind a successful refresh
    /// finds a different token in the store and reuses it.
    async fn refresh_after_rejection(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.store.get_access_token()? {
            if rejected != Some(current.as_str()) {
                tracing::debug!("Session already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        self.refresh_locked().await
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<String, ApiError> {
        let refresh_token = match self.store.get_refresh_token()? {
            Some(rt) => rt,
            None => return Err(ApiError::Unauthorized),
        };

        tracing::info!("Refreshing access token...");
        match self.exchange_refresh_token(&refresh_token).await {
            Ok(resp) => {
                let access = resp.access_token.unwrap_or_default();
                let refresh = resp
                    .refresh_token
                    .filter(|rt| !rt.is_empty())
                    .unwrap_or(refresh_token);
                self.store.set_tokens(&access, &refresh)?;
                tracing::info!("Access token refreshed");
                Ok(access)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                if let Err(clear_err) = self.store.clear_tokens() {
                    tracing::warn!("Failed to clear stored tokens: {}", clear_err);
                }
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let failed = |status: Option<StatusCode>, reason: String| ApiError::RefreshFailed {
            status,
            reason,
        };

        let url = Endpoint::RefreshToken
            .url(&self.base_url, &[])
            .map_err(|e| failed(None, format!("invalid URL: {}", e)))?;
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })
        .map_err(|e| failed(None, e.to_string()))?;
        let request =
            RequestSpec::new(Endpoint::RefreshToken.method(), url).with_body(RequestBody::Json(body));

        tracing::debug!("{} {}", request.method, request.url);
        let resp = self
            .transport
            .send(&request)
            .await
            .map_err(|e| failed(None, e.to_string()))?;

        if !resp.status.is_success() {
            return Err(failed(
                Some(resp.status),
                format!("HTTP {}: {}", resp.status.as_u16(), resp.text()),
            ));
        }

        let parsed: RefreshResponse = resp
            .json()
            .map_err(|e| failed(Some(resp.status), format!("invalid refresh response: {}", e)))?;
        if parsed.access_token.as_deref().map_or(true, str::is_empty) {
            return Err(failed(
                Some(resp.status),
                "refresh response has no accessToken".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// Map non-2xx to `RequestFailed`, keeping status and body for the caller.
fn check_status(resp: ApiResponse, url: &str) -> Result<ApiResponse, ApiError> {
    if resp.status.is_success() {
        return Ok(resp);
    }
    Err(ApiError::RequestFailed {
        url: url.to_string(),
        status: Some(resp.status),
        body: resp.text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{json_reply, MockTransport};
    use crate::auth::{test_jwt, MemoryTokenStore};
    use reqwest::Method;
    use serde_json::json;

    const BASE: &str = "https://api.test";
    const REFRESH_PATH: &str = "/api/Verfication/refresh-token";

    fn client(
        transport: MockTransport,
        access: Option<&str>,
        refresh: Option<&str>,
    ) -> ApiClient<MockTransport, MemoryTokenStore> {
        ApiClient::new(
            transport,
            MemoryTokenStore::with_tokens(access, refresh),
            BASE,
        )
    }

    fn me_request() -> RequestSpec {
        RequestSpec::new(Method::GET, format!("{}/api/user/me", BASE))
    }

    /// Backend that accepts only `valid` and hands out `valid` on refresh.
    fn backend(valid: &'static str) -> MockTransport {
        MockTransport::new(move |req| {
            if req.url.ends_with(REFRESH_PATH) {
                return json_reply(200, json!({ "accessToken": valid }));
            }
            if req.bearer() == Some(valid) {
                json_reply(200, json!({ "userId": "u1" }))
            } else {
                json_reply(401, json!({ "message": "expired" }))
            }
        })
    }

    #[tokio::test]
    async fn test_success_passes_through_untouched() {
        let api = client(backend("good"), Some("good"), Some("r1"));

        let resp = api.execute(me_request()).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.json::<serde_json::Value>().unwrap()["userId"], "u1");

        assert_eq!(api.transport().requests().len(), 1);
        assert_eq!(api.transport().count_path(REFRESH_PATH), 0);
        assert_eq!(api.store().write_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_retry_on_401() {
        let api = client(backend("fresh"), Some("stale"), Some("r1"));

        let resp = api.execute(me_request()).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);

        let requests = api.transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].bearer(), Some("stale"));
        assert!(requests[1].url.ends_with(REFRESH_PATH));
        assert_eq!(requests[1].bearer(), None);
        assert_eq!(
            requests[1].body,
            RequestBody::Json(json!({ "refreshToken": "r1" }))
        );
        assert_eq!(requests[2].bearer(), Some("fresh"));

        assert_eq!(api.store().get_access_token().unwrap().as_deref(), Some("fresh"));
        // Refresh token is sticky when the backend does not rotate it.
        assert_eq!(api.store().get_refresh_token().unwrap().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                return json_reply(200, json!({ "accessToken": "a2", "refreshToken": "r2" }));
            }
            match req.bearer() {
                Some("a2") => json_reply(200, json!({})),
                _ => json_reply(401, json!({})),
            }
        });
        let api = client(transport, Some("a1"), Some("r1"));

        api.execute(me_request()).await.unwrap();
        assert_eq!(api.store().get_refresh_token().unwrap().as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_is_unauthorized() {
        let api = client(backend("fresh"), Some("stale"), None);

        let err = api.execute(me_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(api.transport().count_path(REFRESH_PATH), 0);
        assert_eq!(api.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_tokens() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                json_reply(400, json!({ "message": "invalid refresh token" }))
            } else {
                json_reply(401, json!({}))
            }
        });
        let api = client(transport, Some("stale"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        match &err {
            ApiError::RefreshFailed { status, reason } => {
                assert_eq!(*status, Some(StatusCode::BAD_REQUEST));
                assert!(reason.contains("invalid refresh token"));
            }
            other => panic!("expected RefreshFailed, got {:?}", other),
        }
        assert!(err.needs_login());
        assert_eq!(api.store().get_access_token().unwrap(), None);
        assert_eq!(api.store().get_refresh_token().unwrap(), None);
        // Original request only, no retry.
        assert_eq!(api.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_survives_store_clear_error() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                json_reply(403, json!({ "message": "revoked" }))
            } else {
                json_reply(401, json!({}))
            }
        });
        let mut store = MemoryTokenStore::with_tokens(Some("stale"), Some("r1"));
        store.fail_clear = true;
        let api = ApiClient::new(transport, store, BASE);

        let err = api.execute(me_request()).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::RefreshFailed {
                status: Some(StatusCode::FORBIDDEN),
                ..
            }
        ));
        assert!(err.needs_login());
    }

    #[tokio::test]
    async fn test_refresh_network_error_clears_tokens() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                Err(crate::api::transport::TransportError("connection reset".into()))
            } else {
                json_reply(401, json!({}))
            }
        });
        let api = client(transport, Some("stale"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed { status: None, .. }));
        assert_eq!(api.store().get_refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_refresh_without_access_token_in_body_fails() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                json_reply(200, json!({ "message": "ok" }))
            } else {
                json_reply(401, json!({}))
            }
        });
        let api = client(transport, Some("stale"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::RefreshFailed { .. }));
        assert_eq!(api.store().get_access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_401_is_terminal() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REFRESH_PATH) {
                json_reply(200, json!({ "accessToken": "fresh" }))
            } else {
                json_reply(401, json!({ "message": "still no" }))
            }
        });
        let api = client(transport, Some("stale"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        match err {
            ApiError::RequestFailed { status, body, .. } => {
                assert_eq!(status, Some(StatusCode::UNAUTHORIZED));
                assert!(body.contains("still no"));
            }
            other => panic!("expected RequestFailed, got {:?}", other),
        }
        assert_eq!(api.transport().count_path(REFRESH_PATH), 1);
        assert_eq!(api.transport().requests().len(), 3);
        // The refresh itself succeeded, so the new pair stays.
        assert_eq!(api.store().get_access_token().unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let transport = MockTransport::new(|_| json_reply(500, json!({ "error": "boom" })));
        let api = client(transport, Some("tok"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::RequestFailed { status: Some(StatusCode::INTERNAL_SERVER_ERROR), .. }
        ));
        assert_eq!(api.transport().requests().len(), 1);
        assert_eq!(api.store().write_count(), 0);
    }

    #[tokio::test]
    async fn test_network_error_is_request_failed() {
        let transport = MockTransport::new(|_| {
            Err(crate::api::transport::TransportError("dns failure".into()))
        });
        let api = client(transport, Some("tok"), Some("r1"));

        let err = api.execute(me_request()).await.unwrap_err();
        match err {
            ApiError::RequestFailed { status, body, .. } => {
                assert_eq!(status, None);
                assert_eq!(body, "dns failure");
            }
            other => panic!("expected RequestFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pipeline_owns_authorization_header() {
        let api = client(backend("good"), Some("good"), Some("r1"));
        let request = me_request().with_header("Authorization", "Bearer caller-supplied");

        api.execute(request).await.unwrap();
        let requests = api.transport().requests();
        let sent = &requests[0];
        assert_eq!(sent.bearer(), Some("good"));
        assert_eq!(
            sent.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_anonymous_endpoints_skip_auth_and_refresh() {
        let transport = MockTransport::new(|_| json_reply(401, json!({ "message": "bad otp" })));
        let api = client(transport, Some("tok"), Some("r1"));

        let err = api
            .call_json(
                Endpoint::VerifyOtp,
                &[],
                &json!({ "phoneNumber": "9876543210", "otpCode": "0000" }),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::RequestFailed { status: Some(StatusCode::UNAUTHORIZED), .. }
        ));
        let requests = api.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bearer(), None);
        assert_eq!(api.store().get_access_token().unwrap().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let api = client(backend("fresh"), Some("stale"), Some("r1"));

        let (a, b) = tokio::join!(api.execute(me_request()), api.execute(me_request()));
        assert_eq!(a.unwrap().status, StatusCode::OK);
        assert_eq!(b.unwrap().status, StatusCode::OK);

        assert_eq!(api.transport().count_path(REFRESH_PATH), 1);
        assert_eq!(api.store().write_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_fresh_refreshes_expired_jwt() {
        let expired = test_jwt(1);
        let api = client(backend("fresh"), Some(expired.as_str()), Some("r1"));

        api.ensure_fresh().await.unwrap();
        assert_eq!(api.transport().count_path(REFRESH_PATH), 1);
        assert_eq!(api.store().get_access_token().unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_ensure_fresh_leaves_valid_and_opaque_tokens() {
        let valid = test_jwt(u64::from(u32::MAX));
        let api = client(backend("fresh"), Some(valid.as_str()), Some("r1"));
        api.ensure_fresh().await.unwrap();

        let opaque = client(backend("fresh"), Some("opaque"), Some("r1"));
        opaque.ensure_fresh().await.unwrap();

        assert!(api.transport().requests().is_empty());
        assert!(opaque.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_fresh_with_expired_refresh_token() {
        let expired = test_jwt(1);
        let api = client(backend("fresh"), Some(expired.as_str()), Some(expired.as_str()));

        let err = api.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert!(api.transport().requests().is_empty());
        assert_eq!(api.store().get_access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_fresh_without_any_tokens() {
        let api = client(backend("fresh"), None, None);
        assert!(matches!(api.ensure_fresh().await, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_invalid_base_url_is_request_failed() {
        let api = ApiClient::new(
            MockTransport::new(|_| json_reply(200, json!({}))),
            MemoryTokenStore::default(),
            "::not a url::",
        );
        let err = tokio_test::block_on(api.call(Endpoint::CurrentUser, &[], RequestBody::Empty))
            .unwrap_err();
        assert!(matches!(err, ApiError::RequestFailed { status: None, .. }));
        assert!(api.transport().requests().is_empty());
    }
}

//! Request descriptors and the HTTP transport seam
//!
//! A `RequestSpec` is owned, cloneable data so the pipeline can rebuild the
//! exact same request after a token refresh, multipart uploads included.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart {
        field: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// Outbound request, kept around until the (single) retry is done.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Copy of this request with `Authorization` replaced by the given bearer
    /// token. Caller-supplied `Authorization` values never reach the wire.
    pub fn authorized(&self, bearer: Option<&str>) -> Self {
        let mut req = self.clone();
        req.headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case(AUTHORIZATION.as_str()));
        if let Some(token) = bearer {
            req.headers
                .push((AUTHORIZATION.as_str().to_string(), format!("Bearer {}", token)));
        }
        req
    }

    /// Bearer token this request will present, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.header(AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network-level failure: nothing came back from the server.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends one request and buffers the response. Non-2xx is not an error here.
pub trait Transport {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, TransportError> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart {
                field,
                file_name,
                mime,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| TransportError(format!("invalid mime type {}: {}", mime, e)))?;
                builder.multipart(reqwest::multipart::Form::new().part(field.clone(), part))
            }
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError(format!("{:#}", e)))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError(format!("failed to read response body: {:#}", e)))?;

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

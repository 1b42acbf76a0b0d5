//! Pickup order endpoints

use anyhow::{bail, Context, Result};
use std::path::Path;

use super::client::ApiClient;
use super::endpoints::Endpoint;
use super::transport::{RequestBody, Transport};
use crate::auth::TokenStore;
use crate::models::{CreateOrderRequest, OrderHistoryResponse, OrderRecord, UploadImageResponse};

/// Multipart field name the upload endpoint binds to.
const UPLOAD_FIELD: &str = "file";

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

impl<T: Transport, S: TokenStore> ApiClient<T, S> {
    /// Upload raw image bytes; returns the hosted URL if the backend sent one.
    pub async fn upload_image_bytes(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Option<String>> {
        let body = RequestBody::Multipart {
            field: UPLOAD_FIELD.to_string(),
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        };
        let request = self
            .request(Endpoint::UploadImage, &[])?
            .with_header("Accept", "application/json")
            .with_body(body);

        let resp = self.execute(request).await.context("Image upload failed")?;
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let parsed: UploadImageResponse = resp.json().context("Failed to parse upload response")?;
        Ok(parsed.image_url)
    }

    /// Upload an image file from disk.
    pub async fn upload_image(&self, path: &Path) -> Result<Option<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        tracing::info!("Uploading {} ({} bytes)", file_name, bytes.len());
        self.upload_image_bytes(file_name, mime_for(path), bytes).await
    }

    pub async fn create_order(&self, order: &CreateOrderRequest) -> Result<serde_json::Value> {
        let resp = self
            .call_json(Endpoint::CreateOrder, &[], order)
            .await
            .context("Failed to place order")?;
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        resp.json().context("Failed to parse create-order response")
    }

    /// One page of the user's orders. Pages start at 1.
    pub async fn order_history(
        &self,
        user_id: &str,
        page: u32,
        size: u32,
    ) -> Result<Vec<OrderRecord>> {
        if page == 0 || size == 0 {
            bail!("page and size must both be at least 1");
        }
        let query = [
            ("id", user_id.to_string()),
            ("pagenumber", page.to_string()),
            ("size", size.to_string()),
        ];
        let resp = self
            .call(Endpoint::OrderHistory, &query, RequestBody::Empty)
            .await
            .context("Failed to fetch order history")?;
        let parsed: OrderHistoryResponse =
            resp.json().context("Failed to parse order history")?;
        Ok(parsed.data)
    }
}

//! Signed-in user and in-progress order state
//!
//! A `Session` starts at login (or restore) and is cleared at logout. The
//! delivery address lives only for the order being built.

use anyhow::{Context, Result};

use crate::api::transport::Transport;
use crate::api::ApiClient;
use crate::auth::TokenStore;
use crate::config::Config;
use crate::models::{
    CreateOrderRequest, DeliveryAddress, MaterialSelection, OrderError, SessionUser,
};

#[derive(Debug, Default)]
pub struct Session {
    user: Option<SessionUser>,
    address: Option<DeliveryAddress>,
}

impl Session {
    /// Resume from stored tokens: refresh if needed, then fetch the profile.
    pub async fn restore<T: Transport, S: TokenStore>(client: &ApiClient<T, S>) -> Result<Self> {
        client.ensure_fresh().await?;
        let user = client.current_user().await?;
        tracing::debug!("Session restored for user {}", user.user_id);

        let mut session = Self::default();
        session.begin(user);
        Ok(session)
    }

    /// Start a session for `user`, dropping anything left from a previous one.
    pub fn begin(&mut self, user: SessionUser) {
        self.user = Some(user);
        self.address = None;
    }

    /// Drop the stored credentials along with the in-memory state.
    pub fn end<T: Transport, S: TokenStore>(&mut self, client: &ApiClient<T, S>) -> Result<()> {
        client
            .store()
            .clear_tokens()
            .context("Failed to clear credentials")?;
        self.user = None;
        self.address = None;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&SessionUser> {
        self.user
            .as_ref()
            .context("No signed-in user; run 'pickup-cli login'")
    }

    pub fn update_user_name(&mut self, name: &str) {
        if let Some(user) = self.user.as_mut() {
            user.user_name = Some(name.to_string());
        }
    }

    /// Validate and remember where the pickup should happen.
    pub fn set_address(&mut self, address: DeliveryAddress, config: &Config) -> Result<(), OrderError> {
        address.validate(|pincode| config.is_serviceable(pincode))?;
        self.address = Some(address);
        Ok(())
    }

    pub fn address(&self) -> Option<&DeliveryAddress> {
        self.address.as_ref()
    }

    /// Order payload from the session user, the stored address and the
    /// selected materials.
    pub fn order_request(
        &self,
        selection: &MaterialSelection,
        image_url: Option<String>,
    ) -> Result<CreateOrderRequest> {
        let user = self.require_user()?;
        let address = self
            .address
            .clone()
            .context("No pickup address set for this order")?;
        Ok(CreateOrderRequest {
            user_id: user.user_id.clone(),
            address,
            items: selection.build_items()?,
            image_url,
        })
    }

    /// Place the order and consume the address on success.
    pub async fn place_order<T: Transport, S: TokenStore>(
        &mut self,
        client: &ApiClient<T, S>,
        selection: &MaterialSelection,
        image_url: Option<String>,
    ) -> Result<serde_json::Value> {
        let request = self.order_request(selection, image_url)?;
        let reply = client.create_order(&request).await?;
        self.address = None;
        Ok(reply)
    }
}

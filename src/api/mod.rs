//! API client module for the pickup backend

pub mod client;
pub mod endpoints;
pub mod error;
#[cfg(test)]
pub mod mock;
mod orders;
pub mod transport;
mod users;

pub use client::ApiClient;
pub use error::ApiError;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::models::{find_material, DeliveryAddress, MaterialSelection, MATERIAL_CATALOG};
use crate::session::Session;

/// Client plus a restored session, for commands that need the signed-in user.
async fn signed_in() -> Result<(Config, ApiClient, Session)> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    let session = Session::restore(&client).await?;
    Ok((config, client, session))
}

/// Show current user info
pub async fn whoami() -> Result<()> {
    let (_, _, session) = signed_in().await?;
    let user = session.require_user()?;

    println!();
    println!("Name:  {}", user.display_name());
    println!("Phone: {}", user.phone_number.as_deref().unwrap_or("(none)"));
    println!("Role:  {}", user.user_role.as_deref().unwrap_or("(none)"));
    println!("ID:    {}", user.user_id);
    Ok(())
}

/// Change the signed-in user's display name
pub async fn rename(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Name cannot be empty");
    }
    let (_, client, mut session) = signed_in().await?;
    let user_id = session.require_user()?.user_id.clone();

    client.update_user_name(&user_id, name).await?;
    session.update_user_name(name);
    if let Some(user) = session.user() {
        println!("Name updated to: {}", user.display_name());
    }
    Ok(())
}

/// Register a device push token for the signed-in user
pub async fn register_device(push_token: &str) -> Result<()> {
    let (_, client, session) = signed_in().await?;
    let user = session.require_user()?;
    client.save_push_token(&user.user_id, push_token).await?;
    println!("Device registered.");
    Ok(())
}

/// Upload a photo of the materials and print its URL
pub async fn upload(path: &Path) -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;
    match client.upload_image(path).await? {
        Some(url) => println!("Uploaded: {}", url),
        None => println!("Uploaded (no URL returned)."),
    }
    Ok(())
}

/// Print the material catalog
pub fn list_materials() {
    for (material, subs) in MATERIAL_CATALOG {
        if subs.is_empty() {
            println!("{}", material);
        } else {
            println!("{}: {}", material, subs.join(", "));
        }
    }
}

/// Schedule a pickup
pub async fn place_order(
    address: DeliveryAddress,
    selection: MaterialSelection,
    image: Option<&Path>,
) -> Result<()> {
    for material in &selection.materials {
        find_material(material).with_context(|| {
            format!(
                "Unknown material '{}'. Run 'pickup-cli materials' for the list.",
                material
            )
        })?;
    }

    let (config, client, mut session) = signed_in().await?;
    session.set_address(address, &config)?;

    let image_url = match image {
        Some(path) => client.upload_image(path).await?,
        None => None,
    };

    tracing::info!("Placing order...");
    let reply = session.place_order(&client, &selection, image_url).await?;
    println!("Pickup scheduled.");
    if let Some(id) = reply
        .get("orderId")
        .or_else(|| reply.get("id"))
        .filter(|v| !v.is_null())
    {
        println!("Order: {}", id);
    }
    Ok(())
}

/// List past orders
pub async fn history(page: u32, size: u32) -> Result<()> {
    let (_, client, session) = signed_in().await?;
    let user = session.require_user()?;
    let orders = client.order_history(&user.user_id, page, size).await?;

    if orders.is_empty() {
        println!("No orders on page {}.", page);
        return Ok(());
    }

    println!();
    for order in orders {
        println!(
            "#{}  {}  [{}]",
            order.id_label(),
            order.created().unwrap_or("-"),
            order.status.as_deref().unwrap_or("unknown")
        );
        let address = order.address_line();
        if !address.is_empty() {
            println!("    {}", address);
        }
        let materials = order.materials();
        if !materials.is_empty() {
            println!("    Materials: {}", materials.join(", "));
        }
        if let Some(url) = order.image() {
            println!("    Photo: {}", url);
        }
    }
    Ok(())
}

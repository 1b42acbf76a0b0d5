//! Pickup order models and the material catalog

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Materials accepted for pickup, with the sub-options each one offers.
pub const MATERIAL_CATALOG: &[(&str, &[&str])] = &[
    ("Plastic", &["Bottles", "Containers", "Bags"]),
    ("Paper", &["Newspapers", "Cardboards", "Magazines", "Books"]),
    ("Metal", &["Cans", "Foil", "Scrap Metal"]),
    ("Glass", &["Jars", "Glass Bottles", "Containers"]),
    ("Organic waste", &["Food Scraps", "Yard Waste"]),
    ("Others", &[]),
];

const OTHERS: &str = "Others";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("address field '{0}' is required")]
    MissingField(&'static str),
    #[error("pickup is not available in pincode {0}")]
    NotServiceable(String),
    #[error("at least one material must be selected")]
    NoMaterials,
    #[error("unknown material '{0}'")]
    UnknownMaterial(String),
    #[error("'{0}' is not a sub-option of any selected material")]
    UnknownSubOption(String),
}

/// Canonical catalog entry for a material name, matched case-insensitively.
pub fn find_material(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    MATERIAL_CATALOG
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(name.trim()))
        .copied()
}

/// Where the pickup should happen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl DeliveryAddress {
    /// All fields present and the pincode is one the service covers.
    pub fn validate(&self, serviceable: impl Fn(&str) -> bool) -> Result<(), OrderError> {
        for (name, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("pincode", &self.pincode),
        ] {
            if value.trim().is_empty() {
                return Err(OrderError::MissingField(name));
            }
        }
        if !serviceable(self.pincode.as_str()) {
            return Err(OrderError::NotServiceable(self.pincode.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for DeliveryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {} - {}",
            self.street, self.city, self.state, self.pincode
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubItem {
    pub sub_item_id: u32,
    pub item_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_id: u32,
    pub name: String,
    #[serde(default)]
    pub sub_items: Vec<SubItem>,
}

/// What the user picked on the material screen.
#[derive(Debug, Clone, Default)]
pub struct MaterialSelection {
    pub materials: Vec<String>,
    pub sub_options: Vec<String>,
    /// Replaces the "Others" label when given
    pub custom_material: Option<String>,
}

impl MaterialSelection {
    /// Build the order items: item ids follow selection order starting at 1,
    /// sub-item ids come from one counter shared by all items.
    pub fn build_items(&self) -> Result<Vec<OrderItem>, OrderError> {
        if self.materials.is_empty() {
            return Err(OrderError::NoMaterials);
        }

        let selected = self
            .materials
            .iter()
            .map(|m| find_material(m).ok_or_else(|| OrderError::UnknownMaterial(m.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        for sub in &self.sub_options {
            let known = selected
                .iter()
                .any(|(_, subs)| subs.iter().any(|s| s.eq_ignore_ascii_case(sub.trim())));
            if !known {
                return Err(OrderError::UnknownSubOption(sub.clone()));
            }
        }

        let mut next_sub_id = 1;
        let items = selected
            .iter()
            .enumerate()
            .map(|(index, (material, subs))| {
                let item_id = index as u32 + 1;
                let name = match self.custom_material.as_deref().map(str::trim) {
                    Some(custom) if *material == OTHERS && !custom.is_empty() => custom.to_string(),
                    _ => material.to_string(),
                };
                let sub_items = self
                    .sub_options
                    .iter()
                    .filter_map(|sub| subs.iter().find(|s| s.eq_ignore_ascii_case(sub.trim())))
                    .map(|sub| {
                        let sub_item = SubItem {
                            sub_item_id: next_sub_id,
                            item_id,
                            name: sub.to_string(),
                        };
                        next_sub_id += 1;
                        sub_item
                    })
                    .collect();
                OrderItem {
                    item_id,
                    name,
                    sub_items,
                }
            })
            .collect();

        Ok(items)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: String,
    pub address: DeliveryAddress,
    pub items: Vec<OrderItem>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageResponse {
    pub image_url: Option<String>,
}

/// One entry of the order history
///
/// Records may carry several names for one value (`id`/`orderId`,
/// `imageUrl`/`photo`); the accessors pick the first one set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub order_id: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub address: Option<serde_json::Value>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Plain material names, used when `items` is absent
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl OrderRecord {
    pub fn id_label(&self) -> String {
        let id = if self.id.is_null() { &self.order_id } else { &self.id };
        match id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "?".to_string(),
            other => other.to_string(),
        }
    }

    pub fn created(&self) -> Option<&str> {
        self.created_at
            .as_deref()
            .or(self.created_date.as_deref())
            .or(self.date.as_deref())
    }

    pub fn image(&self) -> Option<&str> {
        self.image_url.as_deref().or(self.photo.as_deref())
    }

    /// Address as a single line, whether the backend sent text or an object.
    pub fn address_line(&self) -> String {
        match &self.address {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value @ serde_json::Value::Object(_)) => {
                match serde_json::from_value::<DeliveryAddress>(value.clone()) {
                    Ok(addr) => addr.to_string(),
                    Err(_) => value.to_string(),
                }
            }
            _ => String::new(),
        }
    }

    pub fn materials(&self) -> Vec<&str> {
        if self.items.is_empty() {
            return self.materials.iter().map(String::as_str).collect();
        }
        self.items.iter().map(|i| i.name.as_str()).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderHistoryResponse {
    #[serde(default)]
    pub data: Vec<OrderRecord>,
}

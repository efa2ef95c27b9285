use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult, Money, ProductCode};

/// Product lifecycle state.
///
/// Products referenced by the ledger are never physically removed; they move to
/// `Inactive` so every ledger entry keeps a valid product to point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

impl core::str::FromStr for ProductStatus {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            other => Err(InventoryError::invalid_field(
                "status",
                format!("unknown product status '{other}'"),
            )),
        }
    }
}

/// A catalog product.
///
/// `quantity` is a materialized view of the ledger: it always equals the sum of the
/// deltas of every ledger entry for this code, and only the ledger writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: ProductCode,
    pub name: String,
    pub category: Option<String>,
    pub price: Money,
    pub quantity: i64,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// quantity × price, or `None` on overflow.
    pub fn stock_value(&self) -> Option<Money> {
        self.price.checked_mul_qty(self.quantity)
    }
}

/// Input for "add product".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub code: ProductCode,
    pub name: String,
    pub price: Money,
    pub category: Option<String>,
}

/// Partial update for "edit product". Quantity is deliberately absent.
///
/// `category: Some(None)` clears the category; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub category: Option<Option<String>>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.price.is_none() && self.category.is_none()
    }
}

pub(crate) const MAX_NAME_LEN: usize = 200;
pub(crate) const MAX_CATEGORY_LEN: usize = 100;

pub(crate) fn validate_name(name: &str) -> InventoryResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InventoryError::invalid_field("name", "cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(InventoryError::invalid_field(
            "name",
            format!("longer than {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_price(price: Money) -> InventoryResult<Money> {
    if price.is_negative() {
        return Err(InventoryError::invalid_field("price", "cannot be negative"));
    }
    Ok(price)
}

/// Blank categories collapse to "no category".
pub(crate) fn normalize_category(category: Option<&str>) -> InventoryResult<Option<String>> {
    let Some(category) = category.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if category.chars().count() > MAX_CATEGORY_LEN {
        return Err(InventoryError::invalid_field(
            "category",
            format!("longer than {MAX_CATEGORY_LEN} characters"),
        ));
    }
    Ok(Some(category.to_string()))
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockbook_catalog::{Product, ProductReader};
use stockbook_core::{InventoryError, InventoryResult};

/// Label used for products without a category.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub products: u64,
    pub units: i64,
}

/// Top `limit` categories among active products.
pub fn category_breakdown<T>(tx: &mut T, limit: usize) -> InventoryResult<Vec<CategoryCount>>
where
    T: ProductReader + ?Sized,
{
    let products = tx.products()?;
    rank_categories(&products, limit)
}

/// Pure half of [`category_breakdown`]: product count descending, then name ascending.
pub fn rank_categories(products: &[Product], limit: usize) -> InventoryResult<Vec<CategoryCount>> {
    if limit == 0 {
        return Err(InventoryError::invalid_field("limit", "must be at least 1"));
    }

    let mut by_category: BTreeMap<&str, (u64, i64)> = BTreeMap::new();
    for product in products.iter().filter(|p| p.is_active()) {
        let key = product.category.as_deref().unwrap_or(UNCATEGORIZED);
        let slot = by_category.entry(key).or_default();
        slot.0 += 1;
        slot.1 = slot.1.saturating_add(product.quantity);
    }

    let mut ranked: Vec<CategoryCount> = by_category
        .into_iter()
        .map(|(category, (products, units))| CategoryCount {
            category: category.to_string(),
            products,
            units,
        })
        .collect();
    // Stable sort: ties keep name order from the map.
    ranked.sort_by(|a, b| b.products.cmp(&a.products));
    ranked.truncate(limit);
    Ok(ranked)
}

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use stockbook_catalog::{Product, ProductFilter, ProductOrder, ProductReader, query::select};
use stockbook_core::{InventoryResult, Money, ProductCode};

/// One row of a tabular export. Column order is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub code: ProductCode,
    pub name: String,
    pub category: Option<String>,
    pub price: Money,
    pub quantity: i64,
    pub updated: DateTime<Utc>,
}

impl ExportRow {
    pub const COLUMNS: [&'static str; 6] = ["code", "name", "category", "price", "quantity", "updated"];

    /// Render in [`Self::COLUMNS`] order.
    pub fn to_record(&self) -> [String; 6] {
        [
            self.code.to_string(),
            self.name.clone(),
            self.category.clone().unwrap_or_default(),
            self.price.to_string(),
            self.quantity.to_string(),
            self.updated.to_rfc3339_opts(SecondsFormat::Secs, true),
        ]
    }
}

impl From<Product> for ExportRow {
    fn from(product: Product) -> Self {
        Self {
            code: product.code,
            name: product.name,
            category: product.category,
            price: product.price,
            quantity: product.quantity,
            updated: product.updated_at,
        }
    }
}

/// Every product matching `filter`, in `order`, unpaginated.
pub fn export_rows<T>(tx: &mut T, filter: &ProductFilter, order: &ProductOrder) -> InventoryResult<Vec<ExportRow>>
where
    T: ProductReader + ?Sized,
{
    let products = tx.products()?;
    Ok(select(products, filter, order).into_iter().map(ExportRow::from).collect())
}

use serde::{Deserialize, Serialize};

use stockbook_catalog::{Product, ProductReader};
use stockbook_core::{InventoryError, InventoryResult, Money, ProductCode};

/// A product under the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub code: ProductCode,
    pub name: String,
    pub quantity: i64,
}

/// Dashboard totals over active products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub product_count: u64,
    pub total_units: i64,
    /// Σ quantity × price.
    pub total_value: Money,
    /// Quantity ascending, then code ascending.
    pub low_stock: Vec<LowStockItem>,
    pub threshold: i64,
}

/// Compute the snapshot from whatever the transaction currently sees.
pub fn snapshot<T>(tx: &mut T, threshold: i64) -> InventoryResult<AggregateSnapshot>
where
    T: ProductReader + ?Sized,
{
    let products = tx.products()?;
    summarize(&products, threshold)
}

/// Pure half of [`snapshot`]: inactive products are skipped.
pub fn summarize(products: &[Product], threshold: i64) -> InventoryResult<AggregateSnapshot> {
    let mut product_count = 0u64;
    let mut total_units = 0i64;
    let mut total_value = 0i128;
    let mut low_stock = Vec::new();

    for product in products.iter().filter(|p| p.is_active()) {
        product_count += 1;
        total_units = total_units
            .checked_add(product.quantity)
            .ok_or_else(|| InventoryError::invalid_field("units", "total overflows"))?;
        total_value = i128::from(product.quantity)
            .checked_mul(i128::from(product.price.minor()))
            .and_then(|v| total_value.checked_add(v))
            .ok_or_else(|| InventoryError::invalid_field("value", "total overflows"))?;

        if product.quantity < threshold {
            low_stock.push(LowStockItem {
                code: product.code.clone(),
                name: product.name.clone(),
                quantity: product.quantity,
            });
        }
    }

    low_stock.sort_by(|a, b| a.quantity.cmp(&b.quantity).then_with(|| a.code.cmp(&b.code)));

    let total_value = Money::from_minor_i128(total_value)
        .ok_or_else(|| InventoryError::invalid_field("value", "total overflows"))?;

    Ok(AggregateSnapshot {
        product_count,
        total_units,
        total_value,
        low_stock,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use stockbook_catalog::ProductStatus;

    use super::*;

    fn product(code: &str, quantity: i64, price_minor: i64) -> Product {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            code: ProductCode::new(code).unwrap(),
            name: format!("{code} name"),
            category: None,
            price: Money::from_minor(price_minor),
            quantity,
            status: ProductStatus::Active,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn low_stock_uses_strict_threshold() {
        let products = vec![product("A", 3, 100), product("B", 10, 250)];
        let snap = summarize(&products, 5).unwrap();

        assert_eq!(snap.product_count, 2);
        assert_eq!(snap.total_units, 13);
        assert_eq!(snap.total_value, Money::from_minor(3 * 100 + 10 * 250));
        let low: Vec<_> = snap.low_stock.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(low, vec!["A"]);

        let at_threshold = summarize(&[product("C", 5, 1)], 5).unwrap();
        assert!(at_threshold.low_stock.is_empty());
    }

    #[test]
    fn low_stock_orders_by_quantity_then_code() {
        let products = vec![product("Z", 1, 1), product("B", 2, 1), product("A", 1, 1)];
        let snap = summarize(&products, 5).unwrap();
        let low: Vec<_> = snap.low_stock.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(low, vec!["A", "Z", "B"]);
    }

    #[test]
    fn inactive_products_are_excluded() {
        let mut retired = product("OLD", 50, 1000);
        retired.status = ProductStatus::Inactive;
        let snap = summarize(&[retired, product("NEW", 1, 100)], 5).unwrap();

        assert_eq!(snap.product_count, 1);
        assert_eq!(snap.total_units, 1);
        assert_eq!(snap.total_value, Money::from_minor(100));
    }

    #[test]
    fn value_overflow_is_reported() {
        let products = vec![product("A", i64::MAX / 2, i64::MAX / 2)];
        let err = summarize(&products, 0).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidField { field: "value", .. }));
    }

    #[test]
    fn empty_catalog_is_all_zero() {
        let snap = summarize(&[], 5).unwrap();
        assert_eq!(snap.product_count, 0);
        assert_eq!(snap.total_value, Money::ZERO);
        assert!(snap.low_stock.is_empty());
    }

    #[test]
    fn serializes_money_as_decimal_string() {
        let snap = summarize(&[product("A", 2, 999)], 5).unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["total_value"], "19.98");
        assert_eq!(json["low_stock"][0]["code"], "A");
    }
}

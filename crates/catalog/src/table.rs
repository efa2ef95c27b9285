use stockbook_core::{InventoryResult, ProductCode};

use crate::product::Product;

/// Read access to the Products table inside a store transaction.
///
/// Methods take `&mut self` because backends run queries on a live connection.
pub trait ProductReader {
    fn product(&mut self, code: &ProductCode) -> InventoryResult<Option<Product>>;

    /// Every product (active and inactive), ordered by code ascending.
    fn products(&mut self) -> InventoryResult<Vec<Product>>;

    /// Number of ledger entries whose product code is `code`.
    fn ledger_references(&mut self, code: &ProductCode) -> InventoryResult<u64>;
}

/// Write access to the Products table inside a store transaction.
pub trait ProductWriter: ProductReader {
    /// Fails with `DuplicateKey` if the code is taken.
    fn insert_product(&mut self, product: &Product) -> InventoryResult<()>;

    /// Replace the stored row for `product.code`. Fails with `NotFound` if absent.
    fn update_product(&mut self, product: &Product) -> InventoryResult<()>;

    fn remove_product(&mut self, code: &ProductCode) -> InventoryResult<()>;
}

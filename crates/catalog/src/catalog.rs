//! Catalog Store operations.
//!
//! Every function runs against a caller-provided transaction; atomicity across the
//! Products and LedgerEntries tables is the store's job, not this module's.

use chrono::{DateTime, Utc};

use stockbook_core::{InventoryError, InventoryResult, ProductCode};

use crate::product::{
    NewProduct, Product, ProductPatch, ProductStatus, normalize_category, validate_name,
    validate_price,
};
use crate::query::{ProductPage, ProductQuery, paginate};
use crate::table::{ProductReader, ProductWriter};

fn missing(code: &ProductCode) -> InventoryError {
    InventoryError::not_found(format!("product '{code}'"))
}

/// Fetch a product by code (active or inactive).
pub fn get_product<T>(tx: &mut T, code: &ProductCode) -> InventoryResult<Product>
where
    T: ProductReader + ?Sized,
{
    tx.product(code)?.ok_or_else(|| missing(code))
}

pub fn list_products<T>(tx: &mut T, query: &ProductQuery) -> InventoryResult<ProductPage>
where
    T: ProductReader + ?Sized,
{
    let products = tx.products()?;
    paginate(products, query)
}

/// Add a product. Quantity starts at zero; stock only arrives through the ledger.
pub fn create_product<T>(tx: &mut T, new: NewProduct, now: DateTime<Utc>) -> InventoryResult<Product>
where
    T: ProductWriter + ?Sized,
{
    let name = validate_name(&new.name)?;
    let price = validate_price(new.price)?;
    let category = normalize_category(new.category.as_deref())?;

    if tx.product(&new.code)?.is_some() {
        return Err(InventoryError::duplicate_key(new.code.as_str()));
    }

    let product = Product {
        code: new.code,
        name,
        category,
        price,
        quantity: 0,
        status: ProductStatus::Active,
        created_at: now,
        updated_at: now,
    };
    tx.insert_product(&product)?;
    Ok(product)
}

/// Edit name, price and/or category. An empty patch is not a mutation.
pub fn update_product<T>(
    tx: &mut T,
    code: &ProductCode,
    patch: ProductPatch,
    now: DateTime<Utc>,
) -> InventoryResult<Product>
where
    T: ProductWriter + ?Sized,
{
    let mut product = get_product(tx, code)?;
    if patch.is_empty() {
        return Ok(product);
    }

    if let Some(name) = patch.name.as_deref() {
        product.name = validate_name(name)?;
    }
    if let Some(price) = patch.price {
        product.price = validate_price(price)?;
    }
    if let Some(category) = patch.category.as_ref() {
        product.category = normalize_category(category.as_deref())?;
    }
    product.updated_at = now;

    tx.update_product(&product)?;
    Ok(product)
}

/// Flag a product inactive. Idempotent: an inactive product is returned untouched.
pub fn deactivate_product<T>(tx: &mut T, code: &ProductCode, now: DateTime<Utc>) -> InventoryResult<Product>
where
    T: ProductWriter + ?Sized,
{
    let mut product = get_product(tx, code)?;
    if product.status == ProductStatus::Inactive {
        return Ok(product);
    }

    product.status = ProductStatus::Inactive;
    product.updated_at = now;
    tx.update_product(&product)?;
    Ok(product)
}

/// Physically remove a product that no ledger entry references.
pub fn delete_product<T>(tx: &mut T, code: &ProductCode) -> InventoryResult<()>
where
    T: ProductWriter + ?Sized,
{
    get_product(tx, code)?;

    let references = tx.ledger_references(code)?;
    if references > 0 {
        return Err(InventoryError::conflict(format!(
            "product '{code}' is referenced by {references} ledger entries; deactivate it instead"
        )));
    }

    tx.remove_product(code)
}

//! Catalog Store: products and their current attributes.
//!
//! Business rules only. Persistence sits behind [`ProductReader`] / [`ProductWriter`],
//! implemented by the store backends in `stockbook-infra`.

pub mod catalog;
pub mod product;
pub mod query;
pub mod table;

pub use catalog::{
    create_product, deactivate_product, delete_product, get_product, list_products,
    update_product,
};
pub use product::{NewProduct, Product, ProductPatch, ProductStatus};
pub use query::{Page, ProductFilter, ProductOrder, ProductPage, ProductQuery, SortKey, StatusScope};
pub use table::{ProductReader, ProductWriter};

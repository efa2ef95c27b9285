//! Product filtering, ordering and pagination.
//!
//! Shared by `list_products` and the export read, so both see the same rows in the
//! same order.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use stockbook_core::{InventoryError, InventoryResult};

use crate::product::{Product, ProductStatus};

/// Which lifecycle states a query includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusScope {
    #[default]
    Active,
    Inactive,
    All,
}

impl StatusScope {
    fn includes(self, status: ProductStatus) -> bool {
        match self {
            StatusScope::Active => status == ProductStatus::Active,
            StatusScope::Inactive => status == ProductStatus::Inactive,
            StatusScope::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub scope: StatusScope,
    /// Case-insensitive substring of name or category.
    pub search: Option<String>,
    /// Case-insensitive exact category match.
    pub category: Option<String>,
}

impl ProductFilter {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            scope: StatusScope::All,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        if !self.scope.includes(product.status) {
            return false;
        }

        if let Some(wanted) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            match product.category.as_deref() {
                Some(actual) if actual.eq_ignore_ascii_case(wanted) => {}
                _ => return false,
            }
        }

        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_category = product
                .category
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&needle));
            if !in_name && !in_category {
                return false;
            }
        }

        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Code,
    Name,
    Quantity,
    Price,
    Updated,
}

/// Sort key plus direction. Ties always break by code ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOrder {
    pub key: SortKey,
    pub descending: bool,
}

impl ProductOrder {
    pub fn by(key: SortKey) -> Self {
        Self {
            key,
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let primary = match self.key {
            SortKey::Code => Ordering::Equal,
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Quantity => a.quantity.cmp(&b.quantity),
            SortKey::Price => a.price.cmp(&b.price),
            SortKey::Updated => a.updated_at.cmp(&b.updated_at),
        };
        let primary = if self.descending { primary.reverse() } else { primary };

        let by_code = a.code.cmp(&b.code);
        let by_code = if self.key == SortKey::Code && self.descending {
            by_code.reverse()
        } else {
            by_code
        };

        primary.then(by_code)
    }

    pub fn sort(&self, products: &mut [Product]) {
        products.sort_by(|a, b| self.compare(a, b));
    }
}

/// Offset/limit window over an ordered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 1000;
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    fn validate(&self) -> InventoryResult<()> {
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(InventoryError::invalid_field(
                "limit",
                format!("must be between 1 and {}", Self::MAX_LIMIT),
            ));
        }
        Ok(())
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductQuery {
    pub filter: ProductFilter,
    pub order: ProductOrder,
    pub page: Page,
}

impl ProductQuery {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: ProductFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_order(mut self, order: ProductOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// One window of a product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    /// Matching products before pagination.
    pub total: usize,
}

/// Filter then order, without pagination.
pub fn select(products: Vec<Product>, filter: &ProductFilter, order: &ProductOrder) -> Vec<Product> {
    let mut selected: Vec<Product> = products.into_iter().filter(|p| filter.matches(p)).collect();
    order.sort(&mut selected);
    selected
}

pub(crate) fn paginate(products: Vec<Product>, query: &ProductQuery) -> InventoryResult<ProductPage> {
    query.page.validate()?;
    let selected = select(products, &query.filter, &query.order);
    let total = selected.len();
    let items = selected
        .into_iter()
        .skip(query.page.offset)
        .take(query.page.limit)
        .collect();
    Ok(ProductPage { items, total })
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::*;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("product name is required")]
    MissingName,
    #[error("product image is required")]
    MissingImage,
    #[error("product colour is required")]
    MissingColor,
    #[error("price must be between 1 and {MAX_PRICE}")]
    InvalidPrice,
    #[error("{0} too long")]
    TooLong(&'static str),
    #[error("invalid price range: {0}")]
    InvalidPriceRange(String),
}

/// Inclusive price bounds in rupees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

impl PriceRange {
    pub fn new(min: u32, max: u32) -> Result<Self, CatalogError> {
        if min > max {
            return Err(CatalogError::InvalidPriceRange(format!("{min}-{max}")));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, price: u32) -> bool {
        self.min <= price && price <= self.max
    }
}

impl FromStr for PriceRange {
    type Err = CatalogError;

    /// Parses the storefront's `min-max` select values, e.g. `1000-2500`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::InvalidPriceRange(s.to_string());
        let (min, max) = s.trim().split_once('-').ok_or_else(invalid)?;
        let min = min.trim().parse().map_err(|_| invalid())?;
        let max = max.trim().parse().map_err(|_| invalid())?;
        PriceRange::new(min, max)
    }
}

/// Storefront filters. Unset fields match everything; set fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilters {
    pub category: Option<Category>,
    pub color: Option<String>,
    pub price_range: Option<PriceRange>,
}

impl ProductFilters {
    pub fn matches(&self, product: &Product) -> bool {
        self.category.is_none_or(|c| product.category == c)
            && self.color.as_deref().is_none_or(|c| product.color == c)
            && self.price_range.is_none_or(|r| r.contains(product.price))
    }

    /// Number of filters currently set.
    pub fn active_count(&self) -> usize {
        [
            self.category.is_some(),
            self.color.is_some(),
            self.price_range.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    /// Apply a price select value; `all` clears the range.
    pub fn set_price_range(&mut self, value: &str) -> Result<(), CatalogError> {
        self.price_range = match value.trim() {
            "all" => None,
            other => Some(other.parse()?),
        };
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Linear scan over `products`, newest first.
pub fn filter_products<'a>(products: impl IntoIterator<Item = &'a Product>, filters: &ProductFilters) -> Vec<Product> {
    let mut matched: Vec<Product> = products
        .into_iter()
        .filter(|p| filters.matches(p))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matched
}

impl ProductDraft {
    /// Check the admin product form before it is sent to the backend.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CatalogError::MissingName);
        }
        if name.len() > MAX_PRODUCT_NAME_LEN {
            return Err(CatalogError::TooLong("product name"));
        }
        if self.image_url.trim().is_empty() {
            return Err(CatalogError::MissingImage);
        }
        if self.image_url.len() > MAX_IMAGE_URL_LEN {
            return Err(CatalogError::TooLong("image url"));
        }
        if self.color.trim().is_empty() {
            return Err(CatalogError::MissingColor);
        }
        if self.color.len() > MAX_COLOR_LEN {
            return Err(CatalogError::TooLong("colour"));
        }
        if self.price == 0 || self.price > MAX_PRICE {
            return Err(CatalogError::InvalidPrice);
        }
        Ok(())
    }
}

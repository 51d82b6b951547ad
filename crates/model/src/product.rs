use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProductId = i64;

/// Product — a catalog entry. Orders copy its name and photo at order time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub photo_url: Option<String>,
    pub is_available: bool,
    pub is_popular: bool,
    pub is_express: bool,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry before it has been stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub photo_url: Option<String>,
    pub is_popular: bool,
    pub is_express: bool,
}

/// Query filter for the public catalog. Unavailable products are never listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub popular: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        product.is_available
            && self
                .category
                .as_deref()
                .is_none_or(|category| product.category.as_deref() == Some(category))
            && self.popular.is_none_or(|popular| product.is_popular == popular)
    }
}

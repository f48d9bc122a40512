//! Forecast products and their kinds.
//!
//! A product is one price/service series. Energy products clear on the
//! day-ahead auction and may go negative; ancillary products (reserve
//! capacity prices) never do. The kind drives plausibility defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Product name as it appears in configuration and in the `product` column.
pub type ProductName = String;

/// Name fragments that mark a product as an energy price.
const ENERGY_MARKERS: [&str; 4] = ["energy", "day_ahead", "spot", "da_"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Energy,
    Ancillary,
}

impl ProductKind {
    /// Infer the kind from a product name.
    pub fn infer(product: &str) -> Self {
        let lower = product.to_ascii_lowercase();
        if ENERGY_MARKERS.iter().any(|m| lower.contains(m)) {
            ProductKind::Energy
        } else {
            ProductKind::Ancillary
        }
    }

    /// Default inclusive price bounds.
    pub fn default_bounds(self) -> (f64, f64) {
        match self {
            ProductKind::Energy => (-500.0, 4000.0),
            ProductKind::Ancillary => (0.0, 10_000.0),
        }
    }

    /// Default z-score threshold for outlier detection.
    pub fn default_z_threshold(self) -> f64 {
        match self {
            ProductKind::Energy => 10.0,
            ProductKind::Ancillary => 5.0,
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductKind::Energy => write!(f, "energy"),
            ProductKind::Ancillary => write!(f, "ancillary"),
        }
    }
}

/// Product kinds with explicit overrides.
///
/// Products without an override fall back to [`ProductKind::infer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    overrides: BTreeMap<ProductName, ProductKind>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: BTreeMap<ProductName, ProductKind>) -> Self {
        Self { overrides }
    }

    pub fn set_kind(&mut self, product: impl Into<ProductName>, kind: ProductKind) {
        self.overrides.insert(product.into(), kind);
    }

    pub fn kind_of(&self, product: &str) -> ProductKind {
        self.overrides
            .get(product)
            .copied()
            .unwrap_or_else(|| ProductKind::infer(product))
    }
}

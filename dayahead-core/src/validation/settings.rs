//! Tunables for the validation engine.

use crate::domain::{ProductCatalog, ProductKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_HORIZON_HOURS: u32 = 24;
pub const DEFAULT_SMOOTHNESS_THRESHOLD: f64 = 0.3;

/// Standard deviations below this are treated as a constant series.
pub const MIN_STD: f64 = 1e-8;

/// Inclusive plausibility bounds for one product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn for_kind(kind: ProductKind) -> Self {
        let (min, max) = kind.default_bounds();
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Z-score thresholds per product kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreThresholds {
    pub energy: f64,
    pub ancillary: f64,
}

impl Default for ZScoreThresholds {
    fn default() -> Self {
        Self {
            energy: ProductKind::Energy.default_z_threshold(),
            ancillary: ProductKind::Ancillary.default_z_threshold(),
        }
    }
}

impl ZScoreThresholds {
    pub fn for_kind(&self, kind: ProductKind) -> f64 {
        match kind {
            ProductKind::Energy => self.energy,
            ProductKind::Ancillary => self.ancillary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl Relation {
    /// Null/NaN operands never satisfy a relation.
    pub fn holds(self, left: f64, right: f64) -> bool {
        if !left.is_finite() || !right.is_finite() {
            return false;
        }
        match self {
            Relation::GreaterThan => left > right,
            Relation::GreaterEqual => left >= right,
            Relation::LessThan => left < right,
            Relation::LessEqual => left <= right,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::GreaterThan => "greater_than",
            Relation::GreaterEqual => "greater_equal",
            Relation::LessThan => "less_than",
            Relation::LessEqual => "less_equal",
        };
        write!(f, "{s}")
    }
}

/// `left <relation> right` must hold at every shared timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub left: String,
    pub relation: Relation,
    pub right: String,
}

impl Relationship {
    pub fn new(left: impl Into<String>, relation: Relation, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            relation,
            right: right.into(),
        }
    }

    /// Every energy product priced above every ancillary product.
    pub fn energy_over_ancillary(products: &[String], catalog: &ProductCatalog) -> Vec<Self> {
        let (energy, ancillary): (Vec<&String>, Vec<&String>) = products
            .iter()
            .partition(|p| catalog.kind_of(p) == ProductKind::Energy);
        energy
            .iter()
            .flat_map(|e| {
                ancillary
                    .iter()
                    .map(move |a| Relationship::new(e.as_str(), Relation::GreaterThan, a.as_str()))
            })
            .collect()
    }
}

/// Everything the engine needs to know about one pipeline's products.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSettings {
    pub schema: bool,
    pub completeness: bool,
    pub plausibility: bool,
    pub consistency: bool,
    pub products: Vec<String>,
    pub horizon_hours: u32,
    pub catalog: ProductCatalog,
    pub bounds: BTreeMap<String, Bounds>,
    pub z_score: ZScoreThresholds,
    pub smoothness_threshold: f64,
    pub relationships: Vec<Relationship>,
}

impl ValidationSettings {
    /// All validators on, default thresholds.
    pub fn for_products(products: &[&str]) -> Self {
        Self {
            schema: true,
            completeness: true,
            plausibility: true,
            consistency: true,
            products: products.iter().map(|p| p.to_string()).collect(),
            horizon_hours: DEFAULT_HORIZON_HOURS,
            catalog: ProductCatalog::new(),
            bounds: BTreeMap::new(),
            z_score: ZScoreThresholds::default(),
            smoothness_threshold: DEFAULT_SMOOTHNESS_THRESHOLD,
            relationships: Vec::new(),
        }
    }
}

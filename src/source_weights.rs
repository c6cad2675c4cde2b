// src/source_weights.rs
//! Source-kind → trust weight table (0–1).
//!
//! The table is configuration, not logic: it can be overridden from a JSON
//! file, and falls back to the built-in seed on any error. Weights feed the
//! composite relevance formula at a fixed 20% share.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

use crate::model::SourceKind;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeights {
    /// Default weight if a kind has no entry.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    #[serde(default)]
    pub weights: HashMap<SourceKind, f64>,
}

fn default_default_weight() -> f64 {
    0.5
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceWeights {
    /// Load from a JSON file, falling back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    pub fn weight_for(&self, kind: SourceKind) -> f64 {
        clamp01(
            self.weights
                .get(&kind)
                .copied()
                .unwrap_or(self.default_weight),
        )
    }

    /// Built-in table: syndicated feeds are most trusted, house content
    /// least (it exists for exclusion, not discovery).
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        for (k, v) in [
            (SourceKind::RssFeed, 1.0),
            (SourceKind::NewsSite, 0.9),
            (SourceKind::DataReport, 0.85),
            (SourceKind::KeywordSearch, 0.8),
            (SourceKind::Competitor, 0.7),
            (SourceKind::HouseContent, 0.3),
        ] {
            weights.insert(k, v);
        }
        Self {
            default_weight: 0.5,
            weights,
        }
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

//! A small keyword-counting classifier loaded from JSON.
//!
//! ```json
//! {
//!   "name": "news",
//!   "categories": { "sports": ["goal", "match"], "science": ["atom"] },
//!   "hyperparameters": { "min_hits": 1 }
//! }
//! ```
//!
//! Each category scores the number of its keywords found in the document
//! (case-insensitive, whole words). Confidences are normalized to sum to one;
//! a document with no hits ranks every category with zero confidence.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::classifier::{Classifier, ClassifierError, Ranking};
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct KeywordModel {
    name: String,
    categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    hyperparameters: Value,
}

impl KeywordModel {
    pub fn new<S: Into<String>>(name: S, categories: BTreeMap<String, Vec<String>>) -> Self {
        Self { name: name.into(), categories, hyperparameters: Value::Null }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let model: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(model)
    }
}

impl Classifier for KeywordModel {
    fn classify(&self, document: &str) -> std::result::Result<Ranking, ClassifierError> {
        let words: Vec<String> = document
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let hits: Vec<usize> = self
            .categories
            .values()
            .map(|keywords| {
                words
                    .iter()
                    .filter(|w| keywords.iter().any(|k| k.to_lowercase() == **w))
                    .count()
            })
            .collect();
        let total: usize = hits.iter().sum();

        let mut ranking: Ranking = hits
            .into_iter()
            .enumerate()
            .map(|(i, n)| (i, if total == 0 { 0.0 } else { n as f64 / total as f64 }))
            .collect();
        // stable, so ties keep category order
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(ranking)
    }

    fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    fn hyperparameters(&self) -> Value {
        self.hyperparameters.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

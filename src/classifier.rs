//! The contract the server expects from an already-trained text classifier.
//!
//! The server never trains or persists a model; it only asks for rankings,
//! category names and a few descriptive fields for the UI.

use serde_json::Value;

pub type ClassifierError = Box<dyn std::error::Error + Send + Sync>;

/// `(category index, confidence)` pairs, best first.
pub type Ranking = Vec<(usize, f64)>;

pub trait Classifier {
    fn classify(&self, document: &str) -> Result<Ranking, ClassifierError>;

    /// The result shape sent to the browser for `classify` requests.
    fn classify_json(&self, document: &str) -> Result<Value, ClassifierError> {
        Ok(serde_json::to_value(self.classify(document)?)?)
    }

    fn categories(&self) -> Vec<String>;

    fn hyperparameters(&self) -> Value;

    fn name(&self) -> String;
}

/// The index stored for a document: the top category when the classifier is
/// confident about it, otherwise `unknown` (the number of known categories).
pub fn top_category(ranking: &[(usize, f64)], unknown: usize) -> usize {
    match ranking.first() {
        Some(&(category, confidence)) if confidence != 0.0 => category,
        _ => unknown,
    }
}

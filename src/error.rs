use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::def::ParsingError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed request: {0}")]
    Parsing(#[from] ParsingError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("classifier failed: {0}")]
    Classifier(ClassifierError),
    #[error("invalid document locator '{0}'")]
    Locator(String),
    #[error("no in-memory document at index {0}")]
    MissingDocument(usize),
    #[error("labels must have the same length as documents ({labels} != {documents})")]
    LengthMismatch { documents: usize, labels: usize },
    #[error("a model must be attached before serving")]
    NoModel,
    #[error("cannot read test set directory {}: {source}", .path.display())]
    TestSet { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

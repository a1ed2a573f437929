//! A small single-process HTTP server for browsing how a trained text
//! classifier labels a test set: it serves the browser UI from disk and
//! answers four POST operations (`ack`, `classify`, `get_info`, `get_doc`).

pub mod classifier;
pub mod corpus;
pub mod def;
pub mod error;
pub mod handler;
pub mod http;
pub mod message;
pub mod model;
pub mod resource;

pub use classifier::{Classifier, Ranking};
pub use error::{Error, Result};
pub use http::{Server, ShutdownHandle};

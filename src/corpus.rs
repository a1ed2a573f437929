//! The labeled test set shown in the browser, classified up front.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{top_category, Classifier};
use crate::error::{Error, Result};

const LINE_TAG: &str = ":line:";
const X_TEST_TAG: &str = ":x_test:";

/// Where the text of a test document can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A whole file is one document.
    File(PathBuf),
    /// One line of a file is one document.
    Line { path: PathBuf, line: usize },
    /// An index into the documents handed over in memory, kept as written.
    /// It is only parsed once there is an in-memory set to index into.
    InMemory(String),
}

impl Locator {
    /// `:line:` takes precedence over `:x_test:`; anything else is a plain path.
    pub fn parse(locator: &str) -> Result<Self> {
        if let Some((path, line)) = locator.rsplit_once(LINE_TAG) {
            let line = line.trim().parse().map_err(|_| Error::Locator(locator.to_string()))?;
            Ok(Locator::Line { path: PathBuf::from(path), line })
        } else if let Some((_, index)) = locator.split_once(X_TEST_TAG) {
            Ok(Locator::InMemory(index.to_string()))
        } else {
            Ok(Locator::File(PathBuf::from(locator)))
        }
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Locator::File(path) => write!(f, "{}", path.display()),
            Locator::Line { path, line } => write!(f, "{}{}{}", path.display(), LINE_TAG, line),
            Locator::InMemory(index) => write!(f, "{}{}", X_TEST_TAG, index),
        }
    }
}

/// Reads `line + 1` lines one after another and returns the last one read,
/// line ending included as stored. Past the end of the file this is the empty string.
fn read_line(path: &Path, line: usize) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut text = String::new();
    for _ in 0..=line {
        text.clear();
        reader.read_line(&mut text)?;
    }

    Ok(text)
}

/// Documents of one category. The three sequences always have the same length.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryDocs {
    #[serde(rename = "path")]
    paths: Vec<String>,
    #[serde(rename = "file")]
    files: Vec<String>,
    #[serde(rename = "clf_result")]
    clf_results: Vec<usize>,
}

impl CategoryDocs {
    fn push(&mut self, file: String, locator: &Locator, clf_result: usize) {
        self.paths.push(locator.to_string());
        self.files.push(file);
        self.clf_results.push(clf_result);
    }

    pub fn paths(&self) -> &[String] { &self.paths }
    pub fn files(&self) -> &[String] { &self.files }
    pub fn clf_results(&self) -> &[usize] { &self.clf_results }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn progress(category: &str, total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(" {msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
            .unwrap_or_else(|e| {
                warn!("Progress template error: {}, using default", e);
                ProgressStyle::default_bar()
            }),
    );
    bar.set_message(format!("Classifying '{}' docs", category));
    bar
}

struct Builder<'c> {
    classifier: &'c dyn Classifier,
    unknown: usize,
    docs: BTreeMap<String, CategoryDocs>,
}

impl<'c> Builder<'c> {
    fn new(classifier: &'c dyn Classifier) -> Self {
        Self { classifier, unknown: classifier.categories().len(), docs: BTreeMap::new() }
    }

    fn classify(&self, document: &str) -> Result<usize> {
        let ranking = self.classifier.classify(document).map_err(Error::Classifier)?;
        Ok(top_category(&ranking, self.unknown))
    }
}

/// Category name → its documents, plus the in-memory texts when the test set
/// was handed over directly instead of read from disk.
#[derive(Debug, Default)]
pub struct TestCorpus {
    docs: BTreeMap<String, CategoryDocs>,
    x_test: Option<Vec<String>>,
}

impl TestCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.x_test = None;
    }

    pub fn docs(&self) -> &BTreeMap<String, CategoryDocs> {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Builds the index from documents and their labels, which must line up
    /// one to one. Returns whether any category was found.
    pub fn build_from_memory(
        &mut self,
        classifier: &dyn Classifier,
        documents: Vec<String>,
        labels: Vec<String>,
    ) -> Result<bool> {
        if documents.len() != labels.len() {
            return Err(Error::LengthMismatch { documents: documents.len(), labels: labels.len() });
        }
        self.clear();

        let mut builder = Builder::new(classifier);
        for label in &labels {
            builder.docs.entry(label.clone()).or_default();
        }
        for (index, (document, label)) in documents.iter().zip(&labels).enumerate() {
            let clf_result = builder.classify(document)?;
            if let Some(category) = builder.docs.get_mut(label) {
                category.push(format!("doc_{}", index), &Locator::InMemory(index.to_string()), clf_result);
            }
        }

        self.docs = builder.docs;
        self.x_test = Some(documents);
        info!("{} categories found", self.len());
        Ok(!self.docs.is_empty())
    }

    /// Builds the index from a test set directory. With `group_by_folder`
    /// every subdirectory is a category holding one document per file;
    /// otherwise every file is a category holding one document per line.
    pub fn build_from_files(
        &mut self,
        classifier: &dyn Classifier,
        directory: &Path,
        group_by_folder: bool,
    ) -> Result<bool> {
        info!("reading files...");
        self.clear();

        let mut builder = Builder::new(classifier);
        for entry in sorted_entries(directory)? {
            if group_by_folder {
                if entry.is_dir() {
                    let category = file_name(&entry);
                    let documents = build_folder_category(&builder, &category, &entry)?;
                    debug!("'{}': {} documents", category, documents.len());
                    builder.docs.insert(category, documents);
                }
            } else if entry.is_file() {
                let category = entry.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                let documents = build_lines_category(&builder, &category, &entry)?;
                debug!("'{}': {} documents", category, documents.len());
                builder.docs.insert(category, documents);
            }
        }

        self.docs = builder.docs;
        info!("{} categories found", self.len());
        Ok(!self.docs.is_empty())
    }

    /// Returns the text a locator points at.
    pub fn resolve(&self, locator: &Locator) -> Result<String> {
        match locator {
            Locator::Line { path, line } => Ok(read_line(path, *line)?),
            Locator::InMemory(index) => match &self.x_test {
                Some(documents) if !documents.is_empty() => {
                    let index: usize = index.trim().parse().map_err(|_| Error::Locator(locator.to_string()))?;
                    documents.get(index).cloned().ok_or(Error::MissingDocument(index))
                }
                // nothing was handed over in memory, whatever the index says
                _ => Ok(String::new()),
            },
            Locator::File(path) => Ok(fs::read_to_string(path)?),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn sorted_entries(directory: &Path) -> Result<Vec<PathBuf>> {
    let to_error = |source| Error::TestSet { path: directory.to_path_buf(), source };
    let mut entries = fs::read_dir(directory)
        .map_err(to_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(to_error)?;
    entries.sort();
    Ok(entries)
}

fn build_folder_category(builder: &Builder, category: &str, folder: &Path) -> Result<CategoryDocs> {
    let files: Vec<PathBuf> = sorted_entries(folder)?.into_iter().filter(|p| p.is_file()).collect();
    let bar = progress(category, files.len());
    let mut documents = CategoryDocs::default();

    for path in files {
        let clf_result = builder.classify(&fs::read_to_string(&path)?)?;
        documents.push(file_name(&path), &Locator::File(path), clf_result);
        bar.inc(1);
    }

    bar.finish_and_clear();
    Ok(documents)
}

fn build_lines_category(builder: &Builder, category: &str, file: &Path) -> Result<CategoryDocs> {
    let content = fs::read_to_string(file)?;
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let bar = progress(category, lines.len());
    let mut documents = CategoryDocs::default();

    for (line, text) in lines.into_iter().enumerate() {
        let clf_result = builder.classify(text)?;
        documents.push(
            format!("doc_{}", line),
            &Locator::Line { path: file.to_path_buf(), line },
            clf_result,
        );
        bar.inc(1);
    }

    bar.finish_and_clear();
    Ok(documents)
}

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::def::ContentType;

const INDEX: &str = "index.html";

/// A file beneath the resource directory that a GET path maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: PathBuf,
    pub extension: String,
}

impl Resource {
    pub fn content_type(&self) -> ContentType {
        ContentType::from_extension(&self.extension)
    }

    pub fn load(&self) -> io::Result<Vec<u8>> {
        if !self.path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a file"));
        }
        fs::read(&self.path)
    }
}

/// Static files of the browser UI, sandboxed under a base directory.
pub struct Resources {
    base: PathBuf,
}

fn is_normal(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

impl Resources {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Maps a decoded URL path onto the base directory. Empty, `.` and `..`
    /// segments are dropped, so the result never leaves the base; a missing
    /// file name means `index.html`.
    pub fn resolve(&self, url_path: &str) -> Resource {
        let (dir, file) = url_path.rsplit_once('/').unwrap_or(("", url_path));
        let file = if is_normal(file) { file } else { INDEX };

        let mut path = self.base.clone();
        for segment in dir.split('/').filter(|s| is_normal(s)) {
            path.push(segment);
        }
        path.push(file);

        let extension = Path::new(file)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();

        Resource { path, extension }
    }
}

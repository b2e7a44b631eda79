//! Enumerates the markdown pages of a site.

use crate::document::slash_path;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const MARKDOWN_EXTENSION: &str = "md";

/// The site's content root (its `pages/` directory).
#[derive(Clone, Debug)]
pub struct ContentSource {
    src_dir: PathBuf,
}

impl ContentSource {
    pub fn new(src_dir: impl Into<PathBuf>) -> Self {
        ContentSource {
            src_dir: src_dir.into(),
        }
    }

    pub fn src_dir(&self) -> &Path {
        &self.src_dir
    }

    /// Returns every `.md` file below the content root as a sorted list of
    /// forward-slash paths relative to it. Hidden entries and `node_modules`
    /// are skipped. A missing content root has no pages.
    pub fn pages(&self) -> Result<Vec<String>> {
        if !self.src_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut pages = Vec::new();
        for result in WalkDir::new(&self.src_dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !Self::is_ignored(e))
        {
            let entry = result?;
            if entry.file_type().is_file() && Self::is_markdown(entry.path()) {
                // strip_prefix shouldn't fail since `src_dir` is always an
                // ancestor of the entry
                if let Ok(relative) = entry.path().strip_prefix(&self.src_dir) {
                    pages.push(slash_path(relative));
                }
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// Whether `path` is a page: a markdown file inside the content root.
    pub fn contains_page(&self, path: &Path) -> bool {
        Self::is_markdown(path) && path.starts_with(&self.src_dir)
    }

    fn is_markdown(path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION)
    }

    fn is_ignored(entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || name == "node_modules"
    }
}

/// Represents the result of enumerating pages.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error enumerating pages.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned for WalkDir I/O errors.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}

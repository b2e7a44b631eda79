//! Orchestrates a full index build: enumerate pages, index them with bounded
//! concurrency, fill the [`LocaleIndexRegistry`], write artifacts, and notify
//! listeners that a new index generation is available.

use crate::config::{Config, SearchProvider};
use crate::content::{self, ContentSource};
use crate::document::{self, DocumentIndexer};
use crate::index::{self, LocaleIndexRegistry};
use crate::markdown::Renderer;
use crate::sections::SplitOptions;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The topic published when any locale's index changes.
pub const LOCAL_SEARCH_INDEX_TOPIC: &str = "@localSearchIndex";

/// The number of pages rendered concurrently unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Receives a notification after every successful build.
pub trait IndexListener: Send + Sync {
    fn publish(&self, topic: &str, version: u64);
}

/// Logs each published generation.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl IndexListener for LogListener {
    fn publish(&self, topic: &str, version: u64) {
        info!(topic, version, "search index updated");
    }
}

/// How the host is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Artifacts are served from memory; build on first load.
    Development,

    /// Artifacts are bundled into the output; always rebuild on load.
    Production,
}

/// What a build produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildSummary {
    pub pages: usize,
    pub records: usize,
    pub locales: Vec<String>,
    pub generation: u64,
    pub elapsed: Duration,
}

/// Builds the local search index for one content root.
pub struct IndexBuilder {
    content: ContentSource,
    renderer: Arc<dyn Renderer>,
    languages: Vec<String>,
    concurrency: usize,
    split_options: SplitOptions,
    artifact_dir: Option<PathBuf>,
    enabled: bool,
    listeners: Vec<Box<dyn IndexListener>>,
    generation: AtomicU64,
}

impl IndexBuilder {
    pub fn new(content: ContentSource, renderer: Arc<dyn Renderer>) -> Self {
        IndexBuilder {
            content,
            renderer,
            languages: vec![String::from("en")],
            concurrency: DEFAULT_CONCURRENCY,
            split_options: SplitOptions::default(),
            artifact_dir: None,
            enabled: true,
            listeners: Vec::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a builder for the site described by `config`, writing
    /// artifacts to its search output directory.
    pub fn from_config(config: &Config, renderer: Arc<dyn Renderer>) -> Self {
        let search = &config.site.search;
        IndexBuilder::new(ContentSource::new(&config.pages_directory), renderer)
            .with_languages(config.site.languages.clone())
            .with_concurrency(search.concurrency)
            .with_split_options(SplitOptions {
                index_leading_content: search.index_leading_content,
            })
            .with_artifact_dir(&config.search_output_directory)
            .with_enabled(search.provider == SearchProvider::Local)
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    /// Sets the render concurrency; values below one are treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_split_options(mut self, split_options: SplitOptions) -> Self {
        self.split_options = split_options;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// A disabled builder leaves every registry empty.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_listener(mut self, listener: Box<dyn IndexListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn content(&self) -> &ContentSource {
        &self.content
    }

    pub fn artifact_dir(&self) -> Option<&Path> {
        self.artifact_dir.as_deref()
    }

    /// The generation of the last successful build; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Rebuilds `registry` from scratch. Page renders run concurrently, at
    /// most `concurrency` at a time; records are inserted as pages finish.
    /// The first failing page aborts the build, dropping renders still in
    /// flight. `cancel` is checked before each render. `registry` is only
    /// replaced once the build succeeds; on error it keeps its old contents.
    pub async fn scan_for_build(
        &self,
        registry: &mut LocaleIndexRegistry,
        cancel: &CancellationToken,
    ) -> Result<BuildSummary> {
        let start = Instant::now();
        let mut fresh = LocaleIndexRegistry::new();

        let pages = match self.enabled {
            true => self.content.pages()?,
            false => {
                debug!("local search disabled; skipping page scan");
                Vec::new()
            }
        };

        let indexer = DocumentIndexer {
            src_dir: self.content.src_dir(),
            languages: &self.languages,
            renderer: self.renderer.as_ref(),
            split_options: self.split_options,
        };

        let mut results = stream::iter(&pages)
            .map(|page| {
                let indexer = &indexer;
                async move {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    Ok(indexer.index_page(page).await?)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut records = 0;
        while let Some(result) = results.next().await {
            let page = result?;
            let index = fresh.get(&page.locale);
            for record in page.records {
                index.add(record)?;
                records += 1;
            }
        }

        if let Some(dir) = &self.artifact_dir {
            fresh.write_artifacts(dir)?;
        }
        *registry = fresh;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        for listener in &self.listeners {
            listener.publish(LOCAL_SEARCH_INDEX_TOPIC, generation);
        }

        let summary = BuildSummary {
            pages: pages.len(),
            records,
            locales: registry.locales().map(str::to_owned).collect(),
            generation,
            elapsed: start.elapsed(),
        };
        info!(
            pages = summary.pages,
            records = summary.records,
            locales = summary.locales.len(),
            generation,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "built search index"
        );
        Ok(summary)
    }

    /// Rebuilds when `path` is a page under the content root. Returns
    /// whether a rebuild happened.
    pub async fn handle_file_change(
        &self,
        path: &Path,
        registry: &mut LocaleIndexRegistry,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !self.content.contains_page(path) {
            return Ok(false);
        }
        debug!(path = %path.display(), "page changed; rebuilding");
        self.scan_for_build(registry, cancel).await?;
        Ok(true)
    }

    /// Prepares `registry` for serving and returns its locales. Production
    /// always rebuilds; development only builds when nothing is loaded yet.
    pub async fn load(
        &self,
        registry: &mut LocaleIndexRegistry,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if mode == Mode::Production || self.generation() == 0 {
            self.scan_for_build(registry, cancel).await?;
        }
        Ok(registry.locales().map(str::to_owned).collect())
    }
}

/// Represents the result of a build.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error building the index.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a page fails to index.
    #[error(transparent)]
    Document(#[from] document::Error),

    /// Returned for index insertion and artifact errors.
    #[error(transparent)]
    Index(#[from] index::Error),

    /// Returned when pages can't be enumerated.
    #[error("enumerating pages: {0}")]
    Content(#[from] content::Error),

    /// Returned when the build was cancelled.
    #[error("build cancelled")]
    Cancelled,
}

//! Turns one page into [`IndexRecord`]s: document id derivation, locale
//! detection, rendering through a [`Renderer`], and section splitting.

use crate::index::IndexRecord;
use crate::markdown::{self, RenderContext, Renderer};
use crate::sections::{split_sections, SplitOptions};
use std::path::{Component, Path};
use tracing::debug;

/// The locale assigned to pages whose first path segment isn't a configured
/// language.
pub const ROOT_LOCALE: &str = "root";

const MARKDOWN_EXTENSION: &str = ".md";
const HTML_EXTENSION: &str = ".html";

/// Derives the URL document id for `file`, a path inside `src_dir`: the
/// relative path, `/`-prefixed, with a trailing `index.md` collapsed to its
/// directory and `.md` replaced by `.html`. For example `pages/posts/hello.md`
/// becomes `/posts/hello.html` and `pages/index.md` becomes `/`.
pub fn doc_id(src_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(src_dir).unwrap_or(file);
    let mut id = String::from("/");
    id.push_str(&slash_path(relative));
    if id.ends_with("/index.md") {
        id.truncate(id.len() - "index.md".len());
    } else if let Some(stem) = id.strip_suffix(MARKDOWN_EXTENSION) {
        id = format!("{}{}", stem, HTML_EXTENSION);
    }
    id
}

/// Joins the normal components of `path` with forward slashes.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the locale for a page path relative to the content root: its
/// first segment when that is one of `languages`, otherwise [`ROOT_LOCALE`].
pub fn locale_for_path<'a>(page: &'a str, languages: &[String]) -> &'a str {
    let first_segment = page.split('/').next().unwrap_or_default();
    match languages.iter().any(|l| l == first_segment) {
        true => first_segment,
        false => ROOT_LOCALE,
    }
}

/// Indexes pages under one content root.
pub struct DocumentIndexer<'a> {
    /// The content root (the site's `pages/` directory).
    pub src_dir: &'a Path,

    /// Locale codes recognized as a page's first path segment.
    pub languages: &'a [String],

    pub renderer: &'a dyn Renderer,

    pub split_options: SplitOptions,
}

/// The records produced for one page, destined for `locale`'s index.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRecords {
    pub locale: String,
    pub records: Vec<IndexRecord>,
}

impl DocumentIndexer<'_> {
    /// Reads and renders `page` (relative to the content root). A file that
    /// no longer exists renders as empty, as does a page whose front matter
    /// sets `search: false`. Render failures propagate.
    pub async fn render_page(&self, page: &str) -> Result<String> {
        let path = self.src_dir.join(page);
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(page, "page vanished before indexing; treating as empty");
                return Ok(String::new());
            }
            Err(err) => {
                return Err(Error::Io {
                    page: page.to_owned(),
                    err,
                })
            }
        };

        let mut ctx = RenderContext {
            path,
            relative_path: page.to_owned(),
            frontmatter: None,
        };
        let html = self
            .renderer
            .render(&source, &mut ctx)
            .await
            .map_err(|err| Error::Render {
                page: page.to_owned(),
                err,
            })?;

        match ctx.frontmatter {
            Some(frontmatter) if frontmatter.excludes_search() => {
                debug!(page, "search disabled in front matter");
                Ok(String::new())
            }
            _ => Ok(html),
        }
    }

    /// Renders `page` and converts its sections into records for its
    /// locale's index.
    pub async fn index_page(&self, page: &str) -> Result<PageRecords> {
        let id = doc_id(self.src_dir, &self.src_dir.join(page));
        let locale = locale_for_path(page, self.languages).to_owned();
        let html = self.render_page(page).await?;
        let records = records_for(&id, &html, self.split_options);
        debug!(page, %locale, records = records.len(), "indexed page");
        Ok(PageRecords { locale, records })
    }
}

/// Converts the sections of a rendered page into records keyed by `doc_id`
/// and each section's anchor.
pub fn records_for(doc_id: &str, html: &str, options: SplitOptions) -> Vec<IndexRecord> {
    split_sections(html, options)
        .filter(|s| !(s.text.is_empty() && s.title.is_empty() && s.titles.is_empty()))
        .map(|s| IndexRecord {
            id: match s.anchor.is_empty() {
                true => doc_id.to_owned(),
                false => format!("{}#{}", doc_id, s.anchor),
            },
            text: s.text,
            title: s.title,
            titles: s.titles,
        })
        .collect()
}

/// Represents the result of indexing a page.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error indexing a page.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a page exists but can't be read.
    #[error("reading page `{page}`: {err}")]
    Io { page: String, err: std::io::Error },

    /// Returned when the renderer fails on a page.
    #[error("rendering page `{page}`: {err}")]
    Render { page: String, err: markdown::Error },
}

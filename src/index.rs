//! Defines [`IndexRecord`], the per-locale [`LocaleIndex`], and the
//! [`LocaleIndexRegistry`] that owns one index per locale. Records are the
//! source of truth; the tantivy index used for querying is materialized from
//! them on demand, and the on-disk artifact is their JSON serialization.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexWriter, TantivyDocument};
use tracing::debug;

/// The file name of the artifact manifest listing every locale.
pub const MANIFEST_FILE: &str = "index.json";

/// One searchable section of one page.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexRecord {
    /// The document id, with `#anchor` for sections below a heading.
    pub id: String,

    pub text: String,

    /// The section's own heading.
    pub title: String,

    /// The enclosing headings, outermost first.
    #[serde(default)]
    pub titles: Vec<String>,
}

/// A scored query result.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub titles: Vec<String>,
    pub score: f32,
}

/// The full-text index for one locale.
#[derive(Default)]
pub struct LocaleIndex {
    records: BTreeMap<String, IndexRecord>,

    /// Built on the first query after a mutation.
    search_index: OnceCell<SearchIndex>,
}

#[derive(Default, Serialize, Deserialize)]
struct Artifact {
    #[serde(default)]
    records: Vec<IndexRecord>,
}

#[derive(Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    locales: Vec<String>,
}

impl LocaleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Ids are unique within a locale, so adding a second
    /// record with the same id fails.
    pub fn add(&mut self, record: IndexRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(Error::DuplicateId(record.id));
        }
        self.records.insert(record.id.clone(), record);
        self.search_index = OnceCell::new();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&IndexRecord> {
        self.records.get(id)
    }

    /// All records, ordered by id.
    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Runs a full-text query over titles, parent titles and text, returning
    /// at most `limit` hits ordered by descending score.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query_terms(query).is_empty() || self.records.is_empty() {
            return Ok(Vec::new());
        }
        let index = self
            .search_index
            .get_or_try_init(|| SearchIndex::build(self.records.values()))?;
        let hits = index
            .search(query, limit)?
            .into_iter()
            .filter_map(|(id, score)| {
                self.records.get(&id).map(|r| SearchHit {
                    id,
                    title: r.title.clone(),
                    titles: r.titles.clone(),
                    score,
                })
            })
            .collect::<Vec<_>>();
        debug!(query, hits = hits.len(), "searched locale index");
        Ok(hits)
    }

    /// Serializes the index into its artifact form.
    pub fn to_artifact(&self) -> Result<String> {
        let artifact = Artifact {
            records: self.records.values().cloned().collect(),
        };
        Ok(serde_json::to_string(&artifact)?)
    }

    /// Restores an index from an artifact produced by
    /// [`LocaleIndex::to_artifact`]. `{}` is an empty index.
    pub fn from_artifact(artifact: &str) -> Result<Self> {
        let artifact: Artifact = serde_json::from_str(artifact)?;
        let mut index = LocaleIndex::new();
        for record in artifact.records {
            index.add(record)?;
        }
        Ok(index)
    }
}

/// Owns one [`LocaleIndex`] per locale for the lifetime of a build session.
#[derive(Default)]
pub struct LocaleIndexRegistry {
    indexes: BTreeMap<String, LocaleIndex>,
}

impl LocaleIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `locale`, creating an empty one on first use.
    pub fn get(&mut self, locale: &str) -> &mut LocaleIndex {
        self.indexes.entry(locale.to_owned()).or_default()
    }

    /// Returns the index for `locale` without creating it.
    pub fn find(&self, locale: &str) -> Option<&LocaleIndex> {
        self.indexes.get(locale)
    }

    /// Drops every locale's index.
    pub fn clear(&mut self) {
        self.indexes.clear();
    }

    /// The known locale codes, sorted.
    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// The number of locales.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// The number of records across all locales.
    pub fn record_count(&self) -> usize {
        self.indexes.values().map(LocaleIndex::len).sum()
    }

    /// The serialized artifact for `locale`. Unknown locales serialize as an
    /// empty index.
    pub fn artifact(&self, locale: &str) -> Result<String> {
        match self.indexes.get(locale) {
            Some(index) => index.to_artifact(),
            None => Ok(serde_json::to_string(&Artifact::default())?),
        }
    }

    /// Writes `{locale}.json` for every locale plus the [`MANIFEST_FILE`]
    /// into `dir`. The manifest is written after the locale artifacts so
    /// readers never see a locale without its artifact. Afterwards the
    /// artifacts of locales listed in the previous manifest but no longer
    /// present are removed; other files in `dir` are left alone.
    pub fn write_artifacts(&self, dir: &Path) -> Result<()> {
        for locale in self.indexes.keys() {
            if !is_valid_locale(locale) {
                return Err(Error::InvalidLocale(locale.clone()));
            }
        }

        std::fs::create_dir_all(dir)?;
        let previous = previous_locales(dir);
        for (locale, index) in &self.indexes {
            std::fs::write(dir.join(artifact_file(locale)), index.to_artifact()?)?;
        }

        let manifest = Manifest {
            locales: self.indexes.keys().cloned().collect(),
        };
        std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_string(&manifest)?)?;

        for locale in previous {
            if self.indexes.contains_key(&locale) || !is_valid_locale(&locale) {
                continue;
            }
            match std::fs::remove_file(dir.join(artifact_file(&locale))) {
                Ok(()) => debug!(locale, "removed stale artifact"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Loads a registry from artifacts written by
    /// [`LocaleIndexRegistry::write_artifacts`].
    pub fn read_artifacts(dir: &Path) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        let mut registry = LocaleIndexRegistry::new();
        for locale in manifest.locales {
            if !is_valid_locale(&locale) {
                return Err(Error::InvalidLocale(locale));
            }
            let artifact = std::fs::read_to_string(dir.join(artifact_file(&locale)))?;
            registry
                .indexes
                .insert(locale, LocaleIndex::from_artifact(&artifact)?);
        }
        Ok(registry)
    }
}

fn artifact_file(locale: &str) -> String {
    format!("{}.json", locale)
}

/// A locale can be written as an artifact if its file neither shadows the
/// manifest nor escapes the artifact directory.
fn is_valid_locale(locale: &str) -> bool {
    !locale.is_empty()
        && artifact_file(locale) != MANIFEST_FILE
        && !locale.contains(&['/', '\\'][..])
        && locale != "."
        && locale != ".."
}

/// The locales named by an existing manifest in `dir`. A missing or
/// unreadable manifest names none.
fn previous_locales(dir: &Path) -> Vec<String> {
    let contents = match std::fs::read_to_string(dir.join(MANIFEST_FILE)) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<Manifest>(&contents) {
        Ok(manifest) => manifest.locales,
        Err(err) => {
            debug!(%err, "ignoring unreadable manifest");
            Vec::new()
        }
    }
}

/// An in-memory tantivy index over a locale's records. Only the id is
/// stored; everything else is looked up in the owning [`LocaleIndex`].
struct SearchIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    title_field: Field,
    titles_field: Field,
    text_field: Field,
}

impl SearchIndex {
    fn build<'a>(records: impl Iterator<Item = &'a IndexRecord>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let titles_field = schema_builder.add_text_field("titles", TEXT);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let index = Index::create_in_ram(schema_builder.build());

        let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
        for record in records {
            let mut doc = TantivyDocument::default();
            doc.add_text(id_field, &record.id);
            doc.add_text(title_field, &record.title);
            for title in &record.titles {
                doc.add_text(titles_field, title);
            }
            doc.add_text(text_field, &record.text);
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index.reader()?;
        Ok(SearchIndex {
            index,
            reader,
            id_field,
            title_field,
            titles_field,
            text_field,
        })
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let mut parser = QueryParser::for_index(
            &self.index,
            vec![self.title_field, self.titles_field, self.text_field],
        );
        parser.set_field_boost(self.title_field, 2.0);
        parser.set_field_boost(self.titles_field, 1.5);

        let query = parser
            .parse_query(&query_terms(query))
            .map_err(|e| Error::Query(e.to_string()))?;

        let mut hits = Vec::new();
        for (score, address) in searcher.search(&query, &TopDocs::with_limit(limit))? {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
                hits.push((id.to_owned(), score));
            }
        }
        Ok(hits)
    }
}

/// Reduces user input to bare terms so nothing in it is read as tantivy
/// query syntax.
fn query_terms(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Represents the result of an index operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a locale index.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a record's id is already present in the locale.
    #[error("duplicate ID: {0}")]
    DuplicateId(String),

    /// Returned when the full-text engine fails.
    #[error("search engine: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Returned when a locale name can't be used as an artifact file name.
    #[error("invalid locale name: {0:?}")]
    InvalidLocale(String),

    /// Returned when a query can't be parsed.
    #[error("invalid query: {0}")]
    Query(String),

    /// Returned when an artifact can't be serialized or deserialized.
    #[error("index artifact: {0}")]
    Artifact(#[from] serde_json::Error),

    /// Returned for I/O errors reading or writing artifacts.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

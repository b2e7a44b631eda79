//! Site configuration. A site is a directory holding a `sitedex.yaml`
//! project file, a `pages/` content root, and optionally a theme whose
//! `theme/theme.yaml` supplies defaults. Layers are deep-merged: theme first,
//! then the project file, then command-line [`Overrides`].

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "sitedex.yaml";

/// Which search backend the site uses. Only `local` builds an index here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Local,
    None,
    /// Any hosted provider; the local index is not built.
    #[serde(other)]
    External,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProvider,

    /// Maximum number of pages rendered concurrently while indexing.
    pub concurrency: usize,

    /// Index the content before a page's first heading as its own section.
    pub index_leading_content: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            provider: SearchProvider::Local,
            concurrency: 10,
            index_leading_content: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmsConfig {
    pub enabled: bool,

    /// Directories below `pages/` whose posts are listed.
    pub include: Vec<String>,

    /// Also write `llms-full.txt` with every post inlined.
    pub full_text: bool,

    /// Also copy each post's raw markdown next to its page.
    pub files: bool,

    /// An extra instruction line placed under the description.
    pub prompt: String,
}

impl Default for LlmsConfig {
    fn default() -> Self {
        LlmsConfig {
            enabled: false,
            include: vec![String::from("posts")],
            full_text: true,
            files: false,
            prompt: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoucGuardConfig {
    pub enabled: bool,

    /// Milliseconds after which the page is revealed regardless; 0 disables
    /// the timeout.
    pub max_duration: u64,
}

impl Default for FoucGuardConfig {
    fn default() -> Self {
        FoucGuardConfig {
            enabled: true,
            max_duration: 5000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Output directory, relative to the project root.
    pub output_dir: PathBuf,

    pub fouc_guard: FoucGuardConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            output_dir: PathBuf::from("dist"),
            fouc_guard: FoucGuardConfig::default(),
        }
    }
}

/// The merged contents of the theme and project files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,

    /// The deployed site's base URL, used for absolute links in `llms.txt`.
    pub url: Option<Url>,

    pub lang: String,

    /// Locale codes recognized as the first path segment of a page.
    pub languages: Vec<String>,

    pub search: SearchConfig,
    pub llms: LlmsConfig,
    pub build: BuildConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            title: String::new(),
            description: String::new(),
            url: None,
            lang: String::from("en"),
            languages: vec![String::from("en")],
            search: SearchConfig::default(),
            llms: LlmsConfig::default(),
            build: BuildConfig::default(),
        }
    }
}

/// Settings from the command line, applied on top of the files.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub output_directory: Option<PathBuf>,
    pub concurrency: Option<usize>,
}

/// A fully resolved configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub root_directory: PathBuf,

    /// The content root, `{root_directory}/pages`.
    pub pages_directory: PathBuf,

    pub output_directory: PathBuf,

    /// Where index artifacts are written, `{output_directory}/search`.
    pub search_output_directory: PathBuf,

    pub site: SiteConfig,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for [`PROJECT_FILE`].
    /// Relative paths are resolved against the working directory first, so
    /// the search reaches the real ancestors of `.`.
    pub fn from_directory(dir: &Path, overrides: &Overrides) -> Result<Config> {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Resolving directory `{}`", dir.display()))?;
        Config::search_ancestors(&dir, overrides)
    }

    fn search_ancestors(dir: &Path, overrides: &Overrides) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path, overrides)
                .with_context(|| format!("Loading configuration from `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(parent) => Config::search_ancestors(parent, overrides),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(path: &Path, overrides: &Overrides) -> Result<Config> {
        let project_root = path.parent().ok_or_else(|| {
            anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )
        })?;

        let mut merged = Value::Null;
        let theme_file = project_root.join("theme").join("theme.yaml");
        if theme_file.exists() {
            merge_yaml(&mut merged, read_yaml(&theme_file, "theme")?);
        }
        merge_yaml(&mut merged, read_yaml(path, "project")?);

        let site: SiteConfig = match merged {
            Value::Null => SiteConfig::default(),
            value => serde_yaml::from_value(value).context("Parsing site configuration")?,
        };
        Ok(Config::resolve(project_root, site, overrides))
    }

    /// Builds a [`Config`] for `site` rooted at `project_root`.
    pub fn resolve(project_root: &Path, mut site: SiteConfig, overrides: &Overrides) -> Config {
        if let Some(concurrency) = overrides.concurrency {
            site.search.concurrency = concurrency;
        }
        site.search.concurrency = site.search.concurrency.max(1);

        let output_directory = match &overrides.output_directory {
            Some(dir) => dir.clone(),
            None => project_root.join(&site.build.output_dir),
        };
        Config {
            root_directory: project_root.to_owned(),
            pages_directory: project_root.join("pages"),
            search_output_directory: output_directory.join("search"),
            output_directory,
            site,
        }
    }
}

fn read_yaml(path: &Path, kind: &str) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Opening {} file `{}`", kind, path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Parsing {} file `{}`", kind, path.display()))
}

/// Merges `overlay` into `base`. Mappings merge key by key, recursively; any
/// other overlay value replaces the base value. A null overlay (e.g. an empty
/// file) changes nothing.
pub fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

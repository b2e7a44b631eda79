//! Generates `llms.txt` (a markdown index of a site's posts for language
//! models, see <https://llmstxt.org/>), `llms-full.txt` with every post
//! inlined, and optional raw `.md` copies of each post.

use crate::config::Config;
use crate::content::{self, ContentSource};
use crate::frontmatter;
use chrono::{DateTime, NaiveDate, NaiveDateTime, ParseError, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LLMS_FILE: &str = "llms.txt";
pub const LLMS_FULL_FILE: &str = "llms-full.txt";

const DEFAULT_SITE_TITLE: &str = "Untitled Site";

/// A post as listed in `llms.txt`.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmsPost {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,

    /// The URL path relative to the site root, e.g. `/posts/hello`.
    pub url_path: String,

    /// The markdown body, front matter removed.
    pub content: String,
}

/// The header shared by both files.
#[derive(Clone, Copy, Debug)]
pub struct LlmsHeader<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub prompt: &'a str,
}

/// Returns the section a post is listed under: its capitalized top-level
/// directory, or `Pages` for top-level pages. `/posts/hello` is in `Posts`,
/// `/about` is in `Pages`.
pub fn section_name(url_path: &str) -> String {
    let mut parts = url_path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(dir), Some(_)) => {
            let mut chars = dir.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => String::from("Pages"),
    }
}

fn write_header(out: &mut String, header: &LlmsHeader) {
    let _ = writeln!(out, "# {}\n", header.title);
    if header.description.is_empty() && header.prompt.is_empty() {
        return;
    }
    if !header.description.is_empty() {
        let _ = writeln!(out, "> {}", header.description);
    }
    if !header.prompt.is_empty() {
        if !header.description.is_empty() {
            out.push_str(">\n");
        }
        let _ = writeln!(out, "> {}", header.prompt);
    }
    out.push('\n');
}

/// Renders `llms.txt`. Posts keep their order within each section; sections
/// appear in order of their first post. Links are absolute when `site_url`
/// is given.
pub fn generate_llms_txt(header: &LlmsHeader, posts: &[LlmsPost], site_url: Option<&str>) -> String {
    let mut out = String::new();
    write_header(&mut out, header);

    let mut sections: Vec<(String, Vec<&LlmsPost>)> = Vec::new();
    for post in posts {
        let name = section_name(&post.url_path);
        match sections.iter_mut().find(|(n, _)| *n == name) {
            Some((_, posts)) => posts.push(post),
            None => sections.push((name, vec![post])),
        }
    }

    let base = site_url.map(|u| u.trim_end_matches('/')).unwrap_or_default();
    for (name, posts) in sections {
        let _ = writeln!(out, "## {}\n", name);
        for post in posts {
            let _ = write!(out, "- [{}]({}{}.md)", post.title, base, post.url_path);
            if !post.description.is_empty() {
                let _ = write!(out, ": {}", post.description);
            }
            out.push('\n');
        }
        out.push('\n');
    }
    trim_final_newline(out)
}

/// Renders `llms-full.txt`: the header followed by every post in full.
pub fn generate_llms_full_txt(header: &LlmsHeader, posts: &[LlmsPost]) -> String {
    let mut out = String::new();
    write_header(&mut out, header);
    for post in posts {
        let _ = writeln!(out, "## {}\n", post.title);
        if !post.description.is_empty() {
            let _ = writeln!(out, "{}\n", post.description);
        }
        let _ = writeln!(out, "{}\n", post.content.trim());
    }
    trim_final_newline(out)
}

// Every block ends with a blank line; the file ends with a single newline.
fn trim_final_newline(mut out: String) -> String {
    if out.ends_with("\n\n") {
        out.pop();
    }
    out
}

/// Parses a front matter date: RFC 3339, `YYYY-MM-DD HH:MM:SS` or
/// `YYYY-MM-DD`, the latter two as UTC.
pub fn parse_date(date: &str) -> std::result::Result<DateTime<Utc>, ParseError> {
    let date = date.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(date) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    Ok(Utc.from_utc_datetime(&naive.and_time(chrono::NaiveTime::MIN)))
}

/// Reads the public posts under `include` (directories relative to the
/// content root), newest first. Drafts and hidden posts are dropped; a post
/// without a title is named after its file.
pub async fn read_posts(src_dir: &Path, include: &[String]) -> Result<Vec<LlmsPost>> {
    let pages = ContentSource::new(src_dir).pages()?;
    let mut posts = Vec::new();
    for page in pages.iter().filter(|p| is_included(p, include)) {
        let source = tokio::fs::read_to_string(src_dir.join(page))
            .await
            .map_err(|err| Error::Io {
                path: src_dir.join(page),
                err,
            })?;
        let (frontmatter, body) = frontmatter::split(&source).map_err(|err| Error::Frontmatter {
            page: page.clone(),
            err,
        })?;
        if frontmatter.draft || frontmatter.hide {
            debug!(page = page.as_str(), "skipping non-public post");
            continue;
        }

        let date = match &frontmatter.date {
            Some(date) => parse_date(date).map_err(|err| Error::Date {
                page: page.clone(),
                err,
            })?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let url_path = format!("/{}", page.strip_suffix(".md").unwrap_or(page));
        let title = match frontmatter.title {
            Some(title) if !title.is_empty() => title,
            _ => Path::new(page)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        posts.push(LlmsPost {
            title,
            description: frontmatter.description.unwrap_or_default(),
            date,
            url_path,
            content: body.trim_start_matches(['\r', '\n']).to_owned(),
        });
    }

    posts.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(posts)
}

fn is_included(page: &str, include: &[String]) -> bool {
    include.iter().any(|dir| {
        let dir = dir.trim_matches('/');
        dir.is_empty()
            || page
                .strip_prefix(dir)
                .map_or(false, |rest| rest.starts_with('/'))
    })
}

/// What [`build_llms`] wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LlmsSummary {
    pub posts: usize,
    pub files: Vec<PathBuf>,
}

/// Writes `llms.txt` (and, as configured, `llms-full.txt` and raw `.md`
/// copies) into the output directory.
pub async fn build_llms(config: &Config) -> Result<LlmsSummary> {
    let site = &config.site;
    let llms = &site.llms;
    let posts = read_posts(&config.pages_directory, &llms.include).await?;

    let site_url = site.url.as_ref().map(|u| u.as_str().to_owned());
    if site_url.is_none() {
        warn!("`url` is not set; llms.txt will use relative links");
    }
    let header = LlmsHeader {
        title: match site.title.is_empty() {
            true => DEFAULT_SITE_TITLE,
            false => site.title.as_str(),
        },
        description: &site.description,
        prompt: &llms.prompt,
    };

    let out_dir = &config.output_directory;
    let mut files = BTreeMap::new();
    files.insert(
        out_dir.join(LLMS_FILE),
        generate_llms_txt(&header, &posts, site_url.as_deref()),
    );
    if llms.full_text {
        files.insert(out_dir.join(LLMS_FULL_FILE), generate_llms_full_txt(&header, &posts));
    }
    if llms.files {
        for post in &posts {
            let path = out_dir.join(format!("{}.md", post.url_path.trim_start_matches('/')));
            files.insert(path, post.content.clone());
        }
    }

    for (path, contents) in &files {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::Io {
                    path: parent.to_owned(),
                    err,
                })?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|err| Error::Io {
                path: path.clone(),
                err,
            })?;
    }

    info!(posts = posts.len(), files = files.len(), "generated llms.txt");
    Ok(LlmsSummary {
        posts: posts.len(),
        files: files.into_keys().collect(),
    })
}

/// Represents the result of generating `llms.txt`.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error generating `llms.txt`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("enumerating posts: {0}")]
    Content(#[from] content::Error),

    #[error("`{path}`: {err}")]
    Io { path: PathBuf, err: std::io::Error },

    #[error("front matter of `{page}`: {err}")]
    Frontmatter { page: String, err: frontmatter::Error },

    /// Returned when a post's `date` isn't in a recognized format.
    #[error("date of `{page}`: {err}")]
    Date { page: String, err: ParseError },
}

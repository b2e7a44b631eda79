//! The page renderer. [`Renderer`] is the seam the indexer renders through;
//! [`MarkdownRenderer`] is the pulldown-cmark implementation used by the CLI.

use crate::frontmatter::{self, Frontmatter};
use async_trait::async_trait;
use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use std::collections::HashSet;
use std::path::PathBuf;

/// Per-page state handed to a [`Renderer`]. The renderer fills in
/// `frontmatter` as a side effect of rendering.
#[derive(Clone, Debug, Default)]
pub struct RenderContext {
    /// The absolute path of the source file.
    pub path: PathBuf,

    /// The path relative to the content root, with forward slashes.
    pub relative_path: String,

    /// The page's front matter, once rendered.
    pub frontmatter: Option<Frontmatter>,
}

/// Converts markdown source into HTML.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, source: &str, ctx: &mut RenderContext) -> Result<String>;
}

/// Renders markdown with pulldown-cmark. Headings receive ids and a trailing
/// `header-anchor` permalink, and math is emitted in KaTeX's MathML shape so
/// the TeX source survives in an `application/x-tex` annotation.
#[derive(Clone, Debug, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        MarkdownRenderer
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render(&self, source: &str, ctx: &mut RenderContext) -> Result<String> {
        let (frontmatter, body) = frontmatter::split(source)?;
        ctx.frontmatter = Some(frontmatter);
        Ok(to_html(body))
    }
}

/// Converts a markdown body (front matter already removed) to HTML.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options.insert(Options::ENABLE_MATH);

    let events: Vec<Event> = Parser::new_ext(markdown, options).collect();
    let ids = heading_ids(&events);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, EventConverter::new(ids).convert(events).into_iter());
    out
}

/// Computes an id for every heading, in document order. Explicit `{#id}`
/// attributes win; otherwise the heading text is slugified. An id already
/// handed out gets the first free `-n` suffix, so ids are unique per page.
fn heading_ids(events: &[Event]) -> Vec<String> {
    let mut ids = Vec::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut current: Option<(Option<String>, String)> = None;

    for event in events {
        match event {
            Event::Start(Tag::Heading { id, .. }) => {
                current = Some((id.as_ref().map(|id| id.to_string()), String::new()));
            }
            Event::Text(text) | Event::Code(text) | Event::InlineMath(text) => {
                if let Some((_, title)) = current.as_mut() {
                    title.push_str(text);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((explicit, title)) = current.take() {
                    let base = match explicit {
                        Some(id) => id,
                        None => match slug::slugify(&title) {
                            s if s.is_empty() => String::from("heading"),
                            s => s,
                        },
                    };
                    let mut id = base.clone();
                    let mut n = 1;
                    while used.contains(&id) {
                        id = format!("{}-{}", base, n);
                        n += 1;
                    }
                    used.insert(id.clone());
                    ids.push(id);
                }
            }
            _ => {}
        }
    }
    ids
}

struct EventConverter {
    ids: std::vec::IntoIter<String>,
}

impl EventConverter {
    fn new(ids: Vec<String>) -> Self {
        EventConverter {
            ids: ids.into_iter(),
        }
    }

    fn convert<'a>(mut self, events: Vec<Event<'a>>) -> Vec<Event<'a>> {
        let mut result = Vec::with_capacity(events.len());
        let mut current_id: Option<String> = None;

        for event in events {
            match event {
                Event::Start(Tag::Heading {
                    level,
                    classes,
                    attrs,
                    ..
                }) => {
                    let id = self.ids.next().unwrap_or_default();
                    current_id = Some(id.clone());
                    result.push(Event::Start(Tag::Heading {
                        level,
                        id: Some(CowStr::Boxed(id.into_boxed_str())),
                        classes,
                        attrs,
                    }));
                }
                Event::End(TagEnd::Heading(level)) => {
                    if let Some(id) = current_id.take() {
                        result.push(Event::InlineHtml(CowStr::Boxed(
                            permalink(&id).into_boxed_str(),
                        )));
                    }
                    result.push(Event::End(TagEnd::Heading(level)));
                }
                Event::InlineMath(tex) => {
                    result.push(Event::InlineHtml(CowStr::Boxed(
                        katex(&tex, false).into_boxed_str(),
                    )));
                }
                Event::DisplayMath(tex) => {
                    result.push(Event::InlineHtml(CowStr::Boxed(
                        katex(&tex, true).into_boxed_str(),
                    )));
                }
                other => result.push(other),
            }
        }
        result
    }
}

fn permalink(id: &str) -> String {
    format!(
        r##" <a class="header-anchor" href="#{}" aria-hidden="true">#</a>"##,
        encode_double_quoted_attribute(id)
    )
}

fn katex(tex: &str, display: bool) -> String {
    let tex = encode_text(tex);
    let inner = format!(
        concat!(
            r#"<span class="katex"><span class="katex-mathml">"#,
            r#"<math xmlns="http://www.w3.org/1998/Math/MathML"><semantics>"#,
            r#"<mrow><mtext>{tex}</mtext></mrow>"#,
            r#"<annotation encoding="application/x-tex">{tex}</annotation>"#,
            r#"</semantics></math></span></span>"#,
        ),
        tex = tex
    );
    match display {
        true => format!(r#"<span class="katex-display">{}</span>"#, inner),
        false => inner,
    }
}

/// Represents the result of a render.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error rendering a page.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the page's front matter can't be separated or parsed.
    #[error("front matter: {0}")]
    Frontmatter(#[from] frontmatter::Error),

    /// Returned by renderers that fail for reasons of their own.
    #[error("{0}")]
    Other(String),
}

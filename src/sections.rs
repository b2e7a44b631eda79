//! Splits a rendered page into heading-delimited [`Section`]s, each carrying
//! the breadcrumb of the headings above it. The splitter is a small state
//! machine driven by the position of the next heading element; see
//! [`split_sections`].

use crate::text::normalize_text;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches one heading element, capturing its level, its attributes, its
/// content, and the level of the closing tag.
static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h([1-6])((?:\s[^>]*)?)>(.*?)</h([1-6])\s*>").unwrap()
});

/// Matches the permalink inside a heading. Everything before it is the
/// heading's title.
static PERMALINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r##"(?is)^(.*)<a\s[^>]*?\bhref="#([^"]*)"[^>]*>[^<]*</a>"##).unwrap()
});

static HREF_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r##"(?i)\bhref="#([^"]*)""##).unwrap());

static ID_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)\bid="([^"]*)""#).unwrap());

/// One heading-delimited chunk of a page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Section {
    /// The heading's fragment identifier. Empty for a leading section.
    pub anchor: String,

    /// The titles of the enclosing headings, outermost first. Does not
    /// include [`Section::title`].
    pub titles: Vec<String>,

    /// The section's own heading text.
    pub title: String,

    /// The normalized body text.
    pub text: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SplitOptions {
    /// Emit the content preceding the first heading as an untitled section.
    /// Off by default, in which case that content is not indexed.
    pub index_leading_content: bool,
}

/// Returns a lazy iterator over the sections of `html`. The iterator is
/// `Clone`, and calling this again restarts from the beginning.
pub fn split_sections(html: &str, options: SplitOptions) -> Sections<'_> {
    Sections {
        html,
        options,
        pos: 0,
        state: State::BeforeFirstHeading,
        parent_titles: Vec::new(),
    }
}

#[derive(Clone, Debug)]
struct Heading {
    /// Byte offset of the opening tag.
    start: usize,

    /// Byte offset just past the closing tag.
    end: usize,

    /// 0-indexed depth (`h1` is 0).
    level: usize,

    /// `None` when the heading carries no fragment link.
    anchor: Option<String>,

    title: String,
}

#[derive(Clone, Debug)]
enum State {
    BeforeFirstHeading,
    InSection(Heading),
    Done,
}

#[derive(Clone, Debug)]
pub struct Sections<'a> {
    html: &'a str,
    options: SplitOptions,

    /// Where the search for the next heading resumes.
    pos: usize,

    state: State,

    /// Title per heading level; empty strings mark levels that were skipped.
    /// Entries deeper than the last heading are left in place and stay
    /// visible to later, deeper headings.
    parent_titles: Vec<String>,
}

impl<'a> Sections<'a> {
    fn find_heading(&self, from: usize) -> Option<Heading> {
        let mut at = from;
        loop {
            let caps = HEADING.captures_at(self.html, at)?;
            let whole = caps.get(0)?;
            // A mismatched close (e.g. `<h2>..</h3>`) isn't a heading we can
            // trust; resume scanning just past its opening tag.
            if caps[1] != caps[4] {
                at = whole.start() + 1;
                continue;
            }
            let level = caps[1].parse::<usize>().ok()?.saturating_sub(1);
            let (anchor, title) = parse_heading(&caps[2], &caps[3]);
            return Some(Heading {
                start: whole.start(),
                end: whole.end(),
                level,
                anchor,
                title,
            });
        }
    }

    /// Advances past the current section: finds the next heading, moves the
    /// state machine onto it, and returns where the current body ends.
    fn advance(&mut self) -> usize {
        match self.find_heading(self.pos) {
            Some(next) => {
                let body_end = next.start;
                self.pos = next.end;
                self.state = State::InSection(next);
                body_end
            }
            None => {
                self.pos = self.html.len();
                self.state = State::Done;
                self.html.len()
            }
        }
    }

    fn titles_for(&self, level: usize) -> Vec<String> {
        self.parent_titles
            .iter()
            .take(level)
            .filter(|t| !t.is_empty())
            .cloned()
            .collect()
    }

    fn push_title(&mut self, level: usize, title: &str) {
        if level == 0 {
            self.parent_titles = vec![title.to_owned()];
            return;
        }
        if self.parent_titles.len() <= level {
            self.parent_titles.resize(level + 1, String::new());
        }
        self.parent_titles[level] = title.to_owned();
    }
}

impl Iterator for Sections<'_> {
    type Item = Section;

    fn next(&mut self) -> Option<Section> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::BeforeFirstHeading => {
                    let body_end = self.advance();
                    if !self.options.index_leading_content {
                        continue;
                    }
                    let text = normalize_text(&self.html[..body_end]);
                    if !text.is_empty() {
                        return Some(Section {
                            text,
                            ..Section::default()
                        });
                    }
                }
                State::InSection(heading) => {
                    let body_end = self.advance();
                    let anchor = match heading.anchor {
                        Some(anchor) => anchor,
                        None => continue,
                    };
                    let text = normalize_text(&self.html[heading.end..body_end]);
                    if heading.title.is_empty() {
                        if text.is_empty() {
                            self.state = State::Done;
                            return None;
                        }
                        continue;
                    }
                    let section = Section {
                        anchor,
                        titles: self.titles_for(heading.level),
                        title: heading.title,
                        text,
                    };
                    self.push_title(heading.level, &section.title);
                    return Some(section);
                }
            }
        }
    }
}

/// Extracts `(anchor, title)` from a heading's attributes and inner HTML.
fn parse_heading(attrs: &str, inner: &str) -> (Option<String>, String) {
    if let Some(caps) = PERMALINK.captures(inner) {
        return (Some(caps[2].to_owned()), normalize_text(&caps[1]));
    }
    let anchor = HREF_ATTR
        .captures(attrs)
        .or_else(|| ID_ATTR.captures(attrs))
        .map(|caps| caps[1].to_owned());
    (anchor, normalize_text(inner))
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn split(html: &str) -> Vec<Section> {
        split_sections(html, SplitOptions::default()).collect()
    }

    fn section(anchor: &str, titles: &[&str], title: &str, text: &str) -> Section {
        Section {
            anchor: anchor.to_owned(),
            titles: titles.iter().map(|t| t.to_string()).collect(),
            title: title.to_owned(),
            text: text.to_owned(),
        }
    }

    #[test]
    fn test_level_reset() {
        let sections =
            split(r##"<h1 href="#a">A</h1>x<h2 href="#b">B</h2>y<h1 href="#c">C</h1>z"##);
        assert_eq!(
            vec![
                section("a", &[], "A", "x"),
                section("b", &["A"], "B", "y"),
                section("c", &[], "C", "z"),
            ],
            sections
        );
    }

    #[test]
    fn test_permalink_anchor() {
        let html = concat!(
            r##"<h1 id="intro">Intro <a class="header-anchor" href="#intro" aria-hidden="true">#</a></h1>"##,
            "<p>Welcome.</p>\n",
            r##"<h2 id="setup">Set <em>up</em> <a class="header-anchor" href="#setup" aria-hidden="true">#</a></h2>"##,
            "<p>Run it.</p>\n",
        );
        assert_eq!(
            vec![
                section("intro", &[], "Intro", "Welcome."),
                section("setup", &["Intro"], "Set up", "Run it."),
            ],
            split(html)
        );
    }

    #[test]
    fn test_skipped_levels() {
        let html = r##"<h1 id="a">A</h1>a<h3 id="c">C</h3>c<h2 id="b">B</h2>b<h4 id="d">D</h4>d"##;
        let sections = split(html);
        assert_eq!(vec!["A".to_owned()], sections[1].titles);
        assert_eq!(vec!["A".to_owned()], sections[2].titles);
        // C keeps its level-2 slot when B takes level 1
        assert_eq!(
            vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            sections[3].titles
        );
    }

    #[test]
    fn test_deeper_entries_overwritten() {
        let html = r##"<h1 id="a">A</h1>a<h2 id="b">B</h2>b<h3 id="c">C</h3>c<h2 id="d">D</h2>d<h3 id="e">E</h3>e"##;
        let sections = split(html);
        assert_eq!(vec!["A".to_owned()], sections[3].titles);
        assert_eq!(vec!["A".to_owned(), "D".to_owned()], sections[4].titles);
    }

    #[test]
    fn test_no_root_heading() {
        let sections = split(r##"<h2 id="x">X</h2>x<h3 id="y">Y</h3>y"##);
        assert_eq!(Vec::<String>::new(), sections[0].titles);
        assert_eq!(vec!["X".to_owned()], sections[1].titles);
    }

    #[test]
    fn test_malformed_heading_skipped() {
        let sections = split(r##"<h1 id="a">A</h1>a<h2>Loose</h2>dropped<h2 id="b">B</h2>b"##);
        assert_eq!(
            vec![section("a", &[], "A", "a"), section("b", &["A"], "B", "b")],
            sections
        );
    }

    #[test]
    fn test_empty_heading_terminates() {
        let sections = split(r##"<h1 id="a">A</h1>a<h2 id="e"></h2><h2 id="b">B</h2>b"##);
        assert_eq!(vec![section("a", &[], "A", "a")], sections);
    }

    #[test]
    fn test_untitled_heading_with_body_skipped() {
        let sections = split(r##"<h1 id="a">A</h1>a<h2 id="e"> </h2>orphan<h2 id="b">B</h2>b"##);
        assert_eq!(
            vec![section("a", &[], "A", "a"), section("b", &["A"], "B", "b")],
            sections
        );
    }

    #[test]
    fn test_heading_without_body() {
        let sections = split(r##"<h1 id="a">A</h1><h2 id="b">B</h2>b"##);
        assert_eq!(
            vec![section("a", &[], "A", ""), section("b", &["A"], "B", "b")],
            sections
        );
    }

    #[test]
    fn test_leading_content() {
        let html = r##"<p>Preamble</p><h1 id="a">A</h1>a"##;
        assert_eq!(vec![section("a", &[], "A", "a")], split(html));

        let options = SplitOptions {
            index_leading_content: true,
        };
        let sections: Vec<Section> = split_sections(html, options).collect();
        assert_eq!(
            vec![section("", &[], "", "Preamble"), section("a", &[], "A", "a")],
            sections
        );
    }

    #[test]
    fn test_no_headings() {
        assert!(split("<p>Just text</p>").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn test_restartable() {
        let html = r##"<h1 id="a">A</h1>a<h2 id="b">B</h2>b"##;
        let sections = split_sections(html, SplitOptions::default());
        let mut first = sections.clone();
        assert_eq!(Some("a".to_owned()), first.next().map(|s| s.anchor));
        assert_eq!(2, sections.count());
    }

    proptest! {
        #[test]
        fn test_section_text_has_no_markup(
            headings in proptest::collection::vec((1usize..=6, "[a-z]{1,6}", "[a-z ]{0,12}"), 0..10)
        ) {
            let html: String = headings
                .iter()
                .enumerate()
                .map(|(i, (lvl, title, body))| {
                    format!(
                        r##"<h{lvl} id="s{i}">{title} <a class="header-anchor" href="#s{i}">#</a></h{lvl}><p><strong>{body}</strong></p>"##
                    )
                })
                .collect();
            let sections: Vec<Section> = split(&html);
            prop_assert_eq!(headings.len(), sections.len());
            for s in &sections {
                for part in std::iter::once(&s.text).chain(std::iter::once(&s.title)).chain(s.titles.iter()) {
                    prop_assert!(!part.contains('<') && !part.contains('>'));
                }
                prop_assert!(s.titles.len() < 6);
            }
        }
    }
}

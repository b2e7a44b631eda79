//! Turns rendered HTML fragments into the plain text that goes into the search
//! index. See [`normalize_text`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a KaTeX wrapper together with everything nested inside it, and
/// captures the original TeX source from its `application/x-tex` annotation.
static KATEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)<span class="katex(?:-display)?">.*?<annotation encoding="application/x-tex">(.*?)</annotation>.*?</span>(?:</span>)?"#,
    )
    .unwrap()
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Converts an HTML fragment into inline searchable text:
///
/// 1. KaTeX wrappers are replaced by their TeX source, padded with spaces, so
///    formulas like `E = mc^2` remain searchable instead of leaving behind
///    rendering fragments.
/// 2. All remaining tags are stripped.
/// 3. Runs of whitespace collapse to a single space and the ends are trimmed.
///
/// Entities are left escaped, so the output never gains angle brackets that
/// weren't markup-free in the input. Applying it twice is the same as
/// applying it once.
pub fn normalize_text(html: &str) -> String {
    let with_tex = replace_katex_with_source(html);
    let stripped = TAG.replace_all(&with_tex, "");
    WHITESPACE.replace_all(&stripped, " ").trim().to_owned()
}

fn replace_katex_with_source(html: &str) -> std::borrow::Cow<'_, str> {
    KATEX.replace_all(html, |caps: &regex::Captures| format!(" {} ", &caps[1]))
}

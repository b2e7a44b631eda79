//! Guards built pages against a flash of unstyled content: the body stays
//! transparent until every stylesheet has loaded, the window `load` event
//! fires, or an optional timeout elapses.

use crate::config::FoucGuardConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// The id of the `<style>` element the reveal script removes.
pub const GUARD_STYLE_ID: &str = "sitedex-fouc";

static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap());

/// Removes the guard once all `link[rel=stylesheet]` sheets are available.
/// Re-checks whenever the head mutates, since stylesheets may be swapped in
/// after parse (e.g. `media="print"` flipped to `media="all"`).
const REVEAL_SCRIPT: &str = concat!(
    "(function(t){var d=0;",
    "function r(){if(d)return;d=1;var s=document.getElementById('sitedex-fouc');if(s)s.remove()}",
    "function c(){var l=document.querySelectorAll('link[rel=\"stylesheet\"]');",
    "for(var i=0;i<l.length;i++){if(!l[i].sheet)return}r()}",
    "new MutationObserver(c).observe(document.head,{childList:true,attributes:true,attributeFilter:['media','rel']});",
    "addEventListener('load',r);",
    "if(t)setTimeout(r,t)})",
);

/// Returns the `<head>` snippet. A `max_duration` of 0 disables the
/// timeout, leaving the stylesheet check and `load` event.
pub fn fouc_guard_html(max_duration: u64) -> String {
    format!(
        concat!(
            r#"<style id="{id}">body{{opacity:0!important}}</style>"#,
            r#"<style>body{{transition:opacity .15s ease}}</style>"#,
            r#"<noscript><style>body{{opacity:1!important}}</style></noscript>"#,
            r#"<script>{script}({max_duration})</script>"#,
        ),
        id = GUARD_STYLE_ID,
        script = REVEAL_SCRIPT,
        max_duration = max_duration,
    )
}

/// Inserts the guard right after the opening `<head>` tag. Documents
/// without a head, documents already guarded, and disabled configurations
/// are returned unchanged.
pub fn inject_fouc_guard(html: &str, config: &FoucGuardConfig) -> String {
    if !config.enabled || html.contains(&format!(r#"id="{}""#, GUARD_STYLE_ID)) {
        return html.to_owned();
    }
    match HEAD_OPEN.find(html) {
        Some(head) => {
            let guard = fouc_guard_html(config.max_duration);
            let mut out = String::with_capacity(html.len() + guard.len());
            out.push_str(&html[..head.end()]);
            out.push_str(&guard);
            out.push_str(&html[head.end()..]);
            out
        }
        None => html.to_owned(),
    }
}

/// Guards every `.html` file below `dir` in place and returns how many
/// files changed.
pub fn inject_fouc_guard_dir(dir: &Path, config: &FoucGuardConfig) -> std::io::Result<usize> {
    let mut changed = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "html") {
            continue;
        }
        let html = std::fs::read_to_string(path)?;
        let guarded = inject_fouc_guard(&html, config);
        if guarded != html {
            std::fs::write(path, guarded)?;
            debug!(path = %path.display(), "injected FOUC guard");
            changed += 1;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod test {
    use super::*;

    const PAGE: &str = "<!DOCTYPE html><html><head><title>x</title></head><body></body></html>";

    #[test]
    fn test_guard_html() {
        let html = fouc_guard_html(5000);
        assert!(html.starts_with(r#"<style id="sitedex-fouc">body{opacity:0!important}</style>"#));
        assert!(html.contains("<noscript><style>body{opacity:1!important}</style></noscript>"));
        assert!(html.contains("MutationObserver"));
        assert!(html.ends_with("(5000)</script>"));
    }

    #[test]
    fn test_zero_duration_disables_timeout() {
        // the script only calls setTimeout for a truthy duration
        assert!(fouc_guard_html(0).ends_with("(0)</script>"));
    }

    #[test]
    fn test_inject() {
        let out = inject_fouc_guard(PAGE, &FoucGuardConfig::default());
        assert!(out.starts_with(r#"<!DOCTYPE html><html><head><style id="sitedex-fouc">"#));
        assert!(out.ends_with("<title>x</title></head><body></body></html>"));
    }

    #[test]
    fn test_inject_head_with_attributes() {
        let out = inject_fouc_guard("<HEAD lang=\"en\"></HEAD>", &FoucGuardConfig::default());
        assert!(out.starts_with(r#"<HEAD lang="en"><style id="sitedex-fouc">"#));
    }

    #[test]
    fn test_inject_once() {
        let config = FoucGuardConfig::default();
        let once = inject_fouc_guard(PAGE, &config);
        assert_eq!(once, inject_fouc_guard(&once, &config));
    }

    #[test]
    fn test_inject_untouched() {
        let disabled = FoucGuardConfig {
            enabled: false,
            ..FoucGuardConfig::default()
        };
        assert_eq!(PAGE, inject_fouc_guard(PAGE, &disabled));
        assert_eq!("<p>fragment</p>", inject_fouc_guard("<p>fragment</p>", &FoucGuardConfig::default()));
        // <header> is not <head>
        assert_eq!("<header></header>", inject_fouc_guard("<header></header>", &FoucGuardConfig::default()));
    }

    #[test]
    fn test_inject_dir() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("posts"))?;
        std::fs::write(dir.path().join("index.html"), PAGE)?;
        std::fs::write(dir.path().join("posts/a.html"), PAGE)?;
        std::fs::write(dir.path().join("style.css"), "<head>")?;

        let config = FoucGuardConfig::default();
        assert_eq!(2, inject_fouc_guard_dir(dir.path(), &config)?);
        assert_eq!(0, inject_fouc_guard_dir(dir.path(), &config)?);
        assert_eq!("<head>", std::fs::read_to_string(dir.path().join("style.css"))?);
        Ok(())
    }
}

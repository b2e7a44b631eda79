//! Collects the bracketed titles of fenced code blocks (```` ```ts [app.ts] ````)
//! across a site, so a theme can emit an icon for every label up front.

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Pages read concurrently by [`scan_code_block_titles`].
pub const SCAN_CONCURRENCY: usize = 64;

/// A fence of three or more backticks indented at most three columns, with
/// a `[title]` later on the same line. Titles may contain one level of
/// nested brackets.
static CODE_BLOCK_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]{0,3}`{3}[^\n\[]*\[((?:[^\[\]]|\[[^\[\]]*\])*)\]").unwrap()
});

/// Adds every code block title in `markdown` to `titles`.
pub fn extract_code_block_titles(markdown: &str, titles: &mut BTreeSet<String>) {
    for captures in CODE_BLOCK_TITLE.captures_iter(markdown) {
        if let Some(title) = captures.get(1) {
            titles.insert(title.as_str().to_owned());
        }
    }
}

/// Reads `pages` (relative to `src_dir`) and returns their code block
/// titles, sorted and deduplicated. Unreadable pages are skipped.
pub async fn scan_code_block_titles(src_dir: &Path, pages: &[String]) -> Vec<String> {
    let mut contents = stream::iter(pages)
        .map(|page| async move {
            match tokio::fs::read_to_string(src_dir.join(page)).await {
                Ok(content) => Some(content),
                Err(err) => {
                    debug!(page = page.as_str(), %err, "failed to read page");
                    None
                }
            }
        })
        .buffer_unordered(SCAN_CONCURRENCY);

    let mut titles = BTreeSet::new();
    while let Some(content) = contents.next().await {
        if let Some(content) = content {
            extract_code_block_titles(&content, &mut titles);
        }
    }
    titles.into_iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn titles(md: &str) -> Vec<String> {
        let mut titles = BTreeSet::new();
        extract_code_block_titles(md, &mut titles);
        titles.into_iter().collect()
    }

    #[test]
    fn test_single_title() {
        assert_eq!(vec!["filename.ts"], titles("```ts [filename.ts]\nconsole.log(\"hello\")\n```"));
    }

    #[test]
    fn test_code_group() {
        let md = "::: code-group\n```sh [pnpm]\npnpm install\n```\n```sh [npm]\nnpm install\n```\n:::";
        assert_eq!(vec!["npm", "pnpm"], titles(md));
    }

    #[test]
    fn test_untitled_block() {
        assert!(titles("```ts\nconst a = 1\n```").is_empty());
    }

    #[test]
    fn test_deduplicates() {
        let md = "```ts [config.ts]\nconst a = 1\n```\n\n```ts [config.ts]\nconst b = 2\n```";
        assert_eq!(vec!["config.ts"], titles(md));
    }

    #[test]
    fn test_accumulates() {
        let mut set = BTreeSet::from(["existing.ts".to_owned()]);
        extract_code_block_titles("```ts [new.ts]\n```", &mut set);
        assert!(set.contains("existing.ts"));
        assert!(set.contains("new.ts"));
    }

    #[test]
    fn test_quadruple_fence() {
        assert_eq!(vec!["nested.ts"], titles("````ts [nested.ts]\n```\ninner\n```\n````"));
    }

    #[test]
    fn test_title_must_be_on_fence_line() {
        assert!(titles("```\n[[toc]]\n```").is_empty());
        assert!(titles("```ts\n[shouldNotMatch.ts]\n```").is_empty());
    }

    #[test]
    fn test_meta_attributes() {
        assert_eq!(vec!["site.config.ts"], titles("```ts {7-9} [site.config.ts]\nexport default {}\n```"));
        assert_eq!(vec!["site.config.ts"], titles("```ts [site.config.ts] {7-9}\nexport default {}\n```"));
    }

    #[test]
    fn test_nested_brackets() {
        assert_eq!(vec!["app [dev].ts"], titles("```ts [app [dev].ts]\n```"));
    }

    #[test]
    fn test_indentation() {
        assert_eq!(vec!["filename.ts"], titles("   ```ts [filename.ts]\n   console.log(\"hello\")\n   ```"));
        assert!(titles("    ```ts [filename.ts]\n    code\n    ```").is_empty());
    }

    #[tokio::test]
    async fn test_scan_skips_unreadable_pages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "```vue [App.vue]\n```\n").unwrap();
        std::fs::write(dir.path().join("b.md"), "```json [package.json]\n```\n").unwrap();
        let pages = vec!["b.md".to_owned(), "missing.md".to_owned(), "a.md".to_owned()];
        assert_eq!(
            vec!["App.vue", "package.json"],
            scan_code_block_titles(dir.path(), &pages).await
        );
    }

    proptest! {
        #[test]
        fn titles_bounded_by_fences(
            blocks in prop::collection::vec(prop::option::of("[a-z]{1,6}\\.[a-z]{1,3}"), 0..20)
        ) {
            let mut md = String::new();
            for title in &blocks {
                match title {
                    Some(title) => md.push_str(&format!("```ts [{}]\ncode\n```\n\n", title)),
                    None => md.push_str("```ts\ncode\n```\n\n"),
                }
            }
            let found = titles(&md);
            let titled = blocks.iter().flatten().collect::<BTreeSet<_>>();
            prop_assert!(found.len() <= blocks.iter().flatten().count());
            prop_assert_eq!(titled.len(), found.len());
        }
    }
}

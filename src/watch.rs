//! Rebuilds the index whenever a page under the content root changes.

use crate::builder::IndexBuilder;
use crate::index::LocaleIndexRegistry;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Watches the builder's content root until `shutdown` is cancelled. Every
/// batch of page changes triggers one full rebuild. A failed rebuild is
/// logged and leaves the previous artifacts in place.
pub async fn watch_and_rebuild(
    builder: &IndexBuilder,
    registry: &mut LocaleIndexRegistry,
    shutdown: &CancellationToken,
) -> Result<()> {
    let src_dir = builder.content().src_dir().to_owned();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )
    .context("Failed to initialize watcher")?;
    watcher
        .watch(&src_dir, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {:?}", src_dir))?;

    info!(dir = %src_dir.display(), "watching for changes (Ctrl+C to stop)");

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut changed = match event {
            Ok(event) => changed_paths(event),
            Err(err) => {
                warn!(%err, "watcher error");
                continue;
            }
        };
        // drain whatever else arrived so a burst of saves rebuilds once
        while let Ok(Ok(event)) = rx.try_recv() {
            changed.extend(changed_paths(event));
        }

        rebuild_batch(builder, registry, shutdown, &changed).await;
    }
    Ok(())
}

/// Rebuilds at most once for a batch of changed paths, and only if one of
/// them is a page. Returns whether a rebuild succeeded. A failure is logged
/// and leaves `registry` and the artifacts as they were.
async fn rebuild_batch(
    builder: &IndexBuilder,
    registry: &mut LocaleIndexRegistry,
    shutdown: &CancellationToken,
    changed: &[PathBuf],
) -> bool {
    let page = match changed.iter().find(|p| builder.content().contains_page(p)) {
        Some(page) => page,
        None => return false,
    };
    match builder.handle_file_change(page, registry, shutdown).await {
        Ok(rebuilt) => rebuilt,
        Err(err) => {
            warn!(path = %page.display(), %err, "rebuild failed; keeping previous index");
            false
        }
    }
}

fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event.paths,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content::ContentSource;
    use crate::markdown::{self, MarkdownRenderer, RenderContext, Renderer};
    use async_trait::async_trait;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails on any page named `broken.md`.
    struct BrokenPageRenderer;

    #[async_trait]
    impl Renderer for BrokenPageRenderer {
        async fn render(&self, source: &str, ctx: &mut RenderContext) -> markdown::Result<String> {
            match ctx.relative_path.ends_with("broken.md") {
                true => Err(markdown::Error::Other("cannot render".to_owned())),
                false => MarkdownRenderer::new().render(source, ctx).await,
            }
        }
    }

    fn site() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let pages = dir.path().canonicalize().unwrap().join("pages");
        std::fs::create_dir_all(&pages).unwrap();
        std::fs::write(pages.join("a.md"), "# Alpha\n\nFirst.\n").unwrap();
        (dir, pages)
    }

    fn builder(pages: &Path, out: &Path) -> IndexBuilder {
        IndexBuilder::new(ContentSource::new(pages), Arc::new(BrokenPageRenderer))
            .with_artifact_dir(out)
    }

    #[tokio::test]
    async fn test_batch_rebuilds_once() {
        let (dir, pages) = site();
        let builder = builder(&pages, &dir.path().join("out"));
        let mut registry = LocaleIndexRegistry::new();
        let shutdown = CancellationToken::new();

        std::fs::write(pages.join("b.md"), "# Beta\n\nSecond.\n").unwrap();
        std::fs::write(pages.join("c.md"), "# Gamma\n\nThird.\n").unwrap();
        let changed = vec![
            pages.join("b.md"),
            pages.join("image.png"),
            pages.join("c.md"),
            pages.join("a.md"),
        ];
        assert!(rebuild_batch(&builder, &mut registry, &shutdown, &changed).await);
        assert_eq!(1, builder.generation());
        assert_eq!(3, registry.record_count());

        let unrelated = vec![pages.join("image.png"), dir.path().join("other.md")];
        assert!(!rebuild_batch(&builder, &mut registry, &shutdown, &unrelated).await);
        assert_eq!(1, builder.generation());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        let (dir, pages) = site();
        let out = dir.path().join("out");
        let builder = builder(&pages, &out);
        let mut registry = LocaleIndexRegistry::new();
        let shutdown = CancellationToken::new();
        assert!(rebuild_batch(&builder, &mut registry, &shutdown, &[pages.join("a.md")]).await);

        std::fs::write(pages.join("broken.md"), "# Broken\n").unwrap();
        assert!(!rebuild_batch(&builder, &mut registry, &shutdown, &[pages.join("broken.md")]).await);
        assert_eq!(1, builder.generation());
        assert!(registry.find("root").and_then(|i| i.get("/a.html#alpha")).is_some());

        let on_disk = LocaleIndexRegistry::read_artifacts(&out).unwrap();
        assert!(on_disk.find("root").and_then(|i| i.get("/a.html#alpha")).is_some());
    }

    #[tokio::test]
    async fn test_watch_rebuilds_on_page_write() {
        let (dir, pages) = site();
        let builder = builder(&pages, &dir.path().join("out"));
        let mut registry = LocaleIndexRegistry::new();
        let shutdown = CancellationToken::new();

        let driver = async {
            // let the watcher register before touching the tree
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::fs::write(pages.join("new.md"), "# New\n\nFresh.\n").unwrap();
            let bumped = tokio::time::timeout(Duration::from_secs(10), async {
                while builder.generation() == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            })
            .await;
            shutdown.cancel();
            bumped.is_ok()
        };

        let (watched, rebuilt) =
            tokio::join!(watch_and_rebuild(&builder, &mut registry, &shutdown), driver);
        watched.unwrap();
        assert!(rebuilt);
        assert!(registry.find("root").and_then(|i| i.get("/new.html#new")).is_some());
    }

    #[test]
    fn test_changed_paths() {
        let path = PathBuf::from("/site/pages/a.md");
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert_eq!(vec![path.clone()], changed_paths(event));

        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone());
        assert_eq!(vec![path.clone()], changed_paths(event));

        let event = Event::new(EventKind::Access(AccessKind::Any)).add_path(path);
        assert!(changed_paths(event).is_empty());
    }
}

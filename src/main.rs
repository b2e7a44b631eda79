use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sitedex::builder::{IndexBuilder, LogListener, Mode};
use sitedex::config::{Config, Overrides};
use sitedex::fouc::inject_fouc_guard_dir;
use sitedex::icons::scan_code_block_titles;
use sitedex::index::LocaleIndexRegistry;
use sitedex::llms::build_llms;
use sitedex::markdown::MarkdownRenderer;
use sitedex::watch::watch_and_rebuild;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Search indexing and post-processing for markdown static sites.
#[derive(Parser, Debug)]
#[command(name = "sitedex", version, about)]
struct Cli {
    /// A directory inside the site; `sitedex.yaml` is searched for upward.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Output directory (overrides `build.output_dir`).
    #[arg(short, long, global = true, env = "SITEDEX_OUTPUT")]
    output: Option<PathBuf>,

    /// Pages rendered concurrently while indexing.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the search index, then run the enabled post-processing steps.
    Build,

    /// Query a built index.
    Search {
        query: String,

        #[arg(long, default_value = "root")]
        locale: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Build the index, then rebuild whenever a page changes.
    Watch,

    /// Write llms.txt (and llms-full.txt) into the output directory.
    Llms,

    /// Print every code block title used by the site.
    Icons,

    /// Inject the FOUC guard into the built HTML files.
    Fouc,
}

fn init_tracing(cli: &Cli) {
    let level = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "warn",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let overrides = Overrides {
        output_directory: cli.output.clone(),
        concurrency: cli.concurrency,
    };
    let config = Config::from_directory(&cli.dir, &overrides)?;

    match cli.command {
        Command::Build => build(&config).await,
        Command::Search {
            query,
            locale,
            limit,
        } => search(&config, &query, &locale, limit),
        Command::Watch => watch(&config).await,
        Command::Llms => {
            build_llms(&config).await.context("Generating llms.txt")?;
            Ok(())
        }
        Command::Icons => {
            let pages = sitedex::content::ContentSource::new(&config.pages_directory).pages()?;
            for title in scan_code_block_titles(&config.pages_directory, &pages).await {
                println!("{}", title);
            }
            Ok(())
        }
        Command::Fouc => fouc(&config),
    }
}

fn index_builder(config: &Config) -> IndexBuilder {
    IndexBuilder::from_config(config, Arc::new(MarkdownRenderer::new()))
        .with_listener(Box::new(LogListener))
}

async fn build(config: &Config) -> Result<()> {
    let builder = index_builder(config);
    let mut registry = LocaleIndexRegistry::new();
    builder
        .load(&mut registry, Mode::Production, &CancellationToken::new())
        .await
        .context("Building search index")?;

    if config.site.llms.enabled {
        build_llms(config).await.context("Generating llms.txt")?;
    }
    fouc(config)
}

fn search(config: &Config, query: &str, locale: &str, limit: usize) -> Result<()> {
    let dir = &config.search_output_directory;
    let registry = LocaleIndexRegistry::read_artifacts(dir).with_context(|| {
        format!(
            "Reading search index from `{}` (run `sitedex build` first)",
            dir.display()
        )
    })?;
    let index = registry
        .find(locale)
        .ok_or_else(|| anyhow!("No index for locale `{}`", locale))?;
    for hit in index.search(query, limit)? {
        let mut breadcrumb = hit.titles.clone();
        breadcrumb.push(hit.title);
        println!("{:>8.3}  {}  {}", hit.score, hit.id, breadcrumb.join(" > "));
    }
    Ok(())
}

async fn watch(config: &Config) -> Result<()> {
    let builder = index_builder(config);
    let mut registry = LocaleIndexRegistry::new();
    let shutdown = CancellationToken::new();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    builder
        .load(&mut registry, Mode::Development, &shutdown)
        .await
        .context("Building search index")?;
    watch_and_rebuild(&builder, &mut registry, &shutdown).await
}

fn fouc(config: &Config) -> Result<()> {
    let fouc_guard = &config.site.build.fouc_guard;
    if !fouc_guard.enabled || !config.output_directory.is_dir() {
        return Ok(());
    }
    let changed = inject_fouc_guard_dir(&config.output_directory, fouc_guard)
        .with_context(|| format!("Guarding HTML in `{}`", config.output_directory.display()))?;
    info!(files = changed, "injected FOUC guard");
    Ok(())
}

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::Level;
use url::Url;

use trawl::analyzer::TextAnalyzer;
use trawl::api::create_router;
use trawl::config::CONFIG;
use trawl::crawler::{CrawlOptions, Crawler};
use trawl::db::{Database, MongoStore};
use trawl::fetcher::Fetcher;
use trawl::indexer::Indexer;
use trawl::query_engine::QueryEngine;
use trawl::storage::Storage;

/// Crawl a growing set of URLs and search what was found.
///
/// Each command does one unit of work and exits; run `crawl` and `index`
/// from cron (or any scheduler) to keep the index growing.
#[derive(Parser, Debug)]
#[command(name = "trawl", version)]
struct Cli {
    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl one batch of untested URLs
    Crawl,
    /// Index every crawled URL that is not indexed yet
    Index,
    /// Search the index and print matching URLs
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Add starting URLs and create default settings if missing
    Seed {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Serve POST /api/search
    Serve,
}

fn init_logging(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Bridge log crate -> tracing (so log::info! etc. work)
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet)?;

    let db = Database::from_config().await?;
    db.ensure_indexes().await?;
    let store = Arc::new(MongoStore::new(&db));
    let text_analyzer = Arc::new(TextAnalyzer::standard());

    match cli.command {
        Command::Crawl => {
            let crawler = Crawler::new(store, Fetcher::from_config()?, CrawlOptions::from_config());
            let report = crawler.run_crawl().await?;
            println!("{:?}", report);
        }
        Command::Index => {
            let indexer = Indexer::new(store, text_analyzer);
            let report = indexer.run_index().await?;
            println!("{:?}", report);
        }
        Command::Search { terms } => {
            let query_engine = QueryEngine::new(store, text_analyzer);
            let records = query_engine.search(&terms.join(" ")).await?;
            if records.is_empty() {
                println!("no results");
            }
            for record in records {
                println!("{}\t{}", record.url, record.page_title);
            }
        }
        Command::Seed { urls } => {
            if store.ensure_default_settings().await? {
                log::info!("created default search settings");
            }
            for url in urls {
                if let Err(e) = Url::parse(&url) {
                    log::error!("skipping {url}: {e}");
                    continue;
                }
                if store.insert_if_absent(&url).await? {
                    log::info!("added {url}");
                } else {
                    log::info!("{url} is already known");
                }
            }
        }
        Command::Serve => {
            let query_engine = Arc::new(QueryEngine::new(store, text_analyzer));
            let listener = tokio::net::TcpListener::bind(&CONFIG.bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", CONFIG.bind_addr))?;
            log::info!("serving search on http://{}", CONFIG.bind_addr);
            axum::serve(listener, create_router(query_engine))
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;
        }
    }
    Ok(())
}

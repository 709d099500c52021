use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tgcollect::collect::api::{ApiCredentials, ApiSearchStrategy};
use tgcollect::collect::browser::BrowserStrategy;
use tgcollect::collect::http::{DesktopFetchStrategy, MobileFetchStrategy};
use tgcollect::collect::orchestrator::Collector;
use tgcollect::collect::{CollectStrategy, StrategyKind};
use tgcollect::config::Config;
use tgcollect::log::{LogSink, StdoutSink};
use tgcollect::session::SessionManager;
use tgcollect::storage::LinkStore;

#[derive(Parser)]
#[command(
    name = "tgcollect",
    version,
    about = "Collect Telegram invite links from x.com search results",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Link database path (defaults to telegram_links.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a real browser on a debugging port for interactive login
    Login {
        /// Remote debugging port
        #[arg(short, long)]
        port: Option<u16>,

        /// Persistent browser profile directory
        #[arg(long)]
        profile_dir: Option<PathBuf>,
    },

    /// Attach to the login browser and save the session snapshot
    #[command(name = "save_login")]
    SaveLogin {
        /// Remote debugging port
        #[arg(short, long)]
        port: Option<u16>,

        /// Snapshot output path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run one collection for a keyword
    ///
    /// Progress is printed as plain log lines; the final line is a JSON
    /// array of {link, source} objects.
    Search {
        /// Search keyword
        keyword: String,

        /// Collection strategy (browser, mobile, desktop)
        #[arg(short, long, default_value = "browser")]
        strategy: String,

        /// Keep the browser open for inspection after the run
        #[arg(long)]
        keep_open: bool,

        /// Session snapshot path
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Run one collection through the official search API
    #[command(name = "api_search")]
    ApiSearch {
        api_key: String,
        api_secret: String,
        access_token: String,
        access_token_secret: String,

        /// Search keyword
        keyword: String,
    },

    /// List stored links, optionally filtered
    Links {
        /// Keyword substring filter
        #[arg(short, long)]
        keyword: Option<String>,

        /// Link substring filter
        #[arg(short, long)]
        link: Option<String>,
    },

    /// Delete stored links by id or by keyword
    Delete {
        /// Row id to delete
        #[arg(long, conflicts_with = "keyword")]
        id: Option<i64>,

        /// Delete every row with this exact keyword
        #[arg(short, long)]
        keyword: Option<String>,
    },

    /// Delete every stored link
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },

    /// Import links from a legacy `links`-table database
    ImportLegacy {
        /// Path to the legacy database file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let mut config = Config::from_env()?;
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }

    match cli.command {
        Commands::Login { port, profile_dir } => {
            if let Some(port) = port {
                config.session.debug_port = port;
            }
            if let Some(dir) = profile_dir {
                config.session.profile_dir = Some(dir);
            }
            login(config)
        }

        Commands::SaveLogin { port, out } => {
            if let Some(port) = port {
                config.session.debug_port = port;
            }
            if let Some(out) = out {
                config.session.snapshot_path = out;
            }
            save_login(config).await
        }

        Commands::Search {
            keyword,
            strategy,
            keep_open,
            snapshot,
        } => {
            if let Some(snapshot) = snapshot {
                config.session.snapshot_path = snapshot;
            }
            tracing::info!(keyword = %keyword, strategy = %strategy, "starting search");
            search(config, keyword, &strategy, keep_open).await
        }

        Commands::ApiSearch {
            api_key,
            api_secret,
            access_token,
            access_token_secret,
            keyword,
        } => {
            tracing::info!(keyword = %keyword, "starting api search");
            let credentials = ApiCredentials {
                api_key,
                api_secret,
                access_token,
                access_token_secret,
            };
            api_search(config, keyword, credentials).await
        }

        Commands::Links { keyword, link } => list_links(config, keyword, link),

        Commands::Delete { id, keyword } => delete(config, id, keyword),

        Commands::Clear { yes } => clear(config, yes),

        Commands::ImportLegacy { path } => import_legacy(config, path),
    }
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("tgcollect=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("tgcollect=info,warn")
    };

    // Diagnostics go to stderr; stdout stays parseable for callers that
    // read the JSON result line.
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

fn login(config: Config) -> Result<()> {
    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);
    let manager = SessionManager::new(config.session);
    manager.launch_for_login(&sink)?;
    Ok(())
}

async fn save_login(config: Config) -> Result<()> {
    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);
    let manager = SessionManager::new(config.session);
    manager.attach_and_save(&sink).await?;
    Ok(())
}

async fn search(config: Config, keyword: String, strategy: &str, keep_open: bool) -> Result<()> {
    let kind = StrategyKind::from_str(strategy).map_err(|e| anyhow::anyhow!(e))?;

    let strategy: Box<dyn CollectStrategy> = match kind {
        StrategyKind::Browser => Box::new(
            BrowserStrategy::new(config.collect.clone(), &config.session).keep_open(keep_open),
        ),
        StrategyKind::MobileFetch => Box::new(MobileFetchStrategy::new(&config.collect)?),
        StrategyKind::DesktopFetch => Box::new(DesktopFetchStrategy::new(&config.collect)?),
        StrategyKind::Api => {
            anyhow::bail!("the api strategy takes credentials; use the api_search subcommand")
        }
    };

    run_collection(&config, &keyword, strategy.as_ref()).await
}

async fn api_search(config: Config, keyword: String, credentials: ApiCredentials) -> Result<()> {
    let strategy = ApiSearchStrategy::new(credentials)?;
    run_collection(&config, &keyword, &strategy).await
}

async fn run_collection(
    config: &Config,
    keyword: &str,
    strategy: &dyn CollectStrategy,
) -> Result<()> {
    let store = LinkStore::open(&config.database.path)?;
    let collector = Collector::new(store);
    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);

    let report = collector.collect(keyword, strategy, sink).await;

    // The machine-readable boundary: exactly one JSON line, always last
    println!("{}", report.results_json());

    if let Some(error) = report.error {
        anyhow::bail!("collection run failed: {error}");
    }
    Ok(())
}

fn list_links(config: Config, keyword: Option<String>, link: Option<String>) -> Result<()> {
    let store = LinkStore::open(&config.database.path)?;
    let rows = store.search(keyword.as_deref(), link.as_deref())?;

    for row in &rows {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            row.id,
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            row.keyword,
            row.link,
            row.source
        );
    }
    println!("{} links", rows.len());
    Ok(())
}

fn delete(config: Config, id: Option<i64>, keyword: Option<String>) -> Result<()> {
    let store = LinkStore::open(&config.database.path)?;

    match (id, keyword) {
        (Some(id), None) => {
            if store.delete(id)? {
                println!("deleted link {id}");
            } else {
                println!("no link with id {id}");
            }
        }
        (None, Some(keyword)) => {
            let count = store.delete_by_keyword(&keyword)?;
            println!("deleted {count} links for keyword \"{keyword}\"");
        }
        _ => anyhow::bail!("pass exactly one of --id or --keyword"),
    }
    Ok(())
}

fn clear(config: Config, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("refusing to wipe the store without --yes");
    }
    let store = LinkStore::open(&config.database.path)?;
    let count = store.clear()?;
    println!("deleted {count} links");
    Ok(())
}

fn import_legacy(config: Config, path: PathBuf) -> Result<()> {
    let store = LinkStore::open(&config.database.path)?;
    let imported = store.import_legacy(&path)?;
    println!("imported {imported} links from {}", path.display());
    Ok(())
}

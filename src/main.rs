use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use feedagg::config::Config;
use feedagg::feed::build_client;
use feedagg::scheduler::{parse_tick_interval, Scheduler};
use feedagg::session::Session;
use feedagg::storage::{resolve_browse_limit, Database, DatabaseError, GraphError};

#[derive(Parser, Debug)]
#[command(name = "feedagg", version, about = "RSS aggregator with per-account timelines")]
struct Args {
    /// Config file (default: ~/.config/feedagg/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an account and log in as it
    Register { name: String },
    /// Log in as an existing account
    Login { name: String },
    /// List all accounts
    Users,
    /// Delete every account, feed, follow, and post
    Reset,
    /// Register a feed and follow it
    Addfeed { name: String, url: String },
    /// List all registered feeds
    Feeds,
    /// Follow a registered feed
    Follow { url: String },
    /// List the feeds you follow
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the most recent posts from followed feeds
    Browse { limit: Option<String> },
    /// Collect feeds forever, one feed per interval (e.g. 30s, 1m)
    Agg { interval: String },
}

/// True if any cause in the chain is an unreachable store.
fn is_storage_unavailable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<DatabaseError>()
            .is_some_and(DatabaseError::is_unavailable)
            || matches!(
                cause.downcast_ref::<GraphError>(),
                Some(GraphError::Database(e)) if e.is_unavailable()
            )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("feedagg=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Err(e) if is_storage_unavailable(&e) => {
            eprintln!("Error: {:#}", e);
            eprintln!("The database could not be reached. Check `database_path` in your config file.");
            std::process::exit(1);
        }
        result => result,
    }
}

async fn open_database(config: &Config, config_path: &Path) -> Result<Database> {
    let db_path = config.database_path(config_path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    Database::open(db_path_str)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let db = open_database(&config, &config_path).await?;

    match args.command {
        Command::Register { name } => {
            let account = db.create_account(&name).await?;
            config.set_current_user(&account.name);
            config.save(&config_path)?;
            println!("Account {} created with ID {}", account.name, account.id);
            println!("Logged in as {}", account.name);
        }
        Command::Login { name } => {
            let account = db.get_account_by_name(&name).await?;
            config.set_current_user(&account.name);
            config.save(&config_path)?;
            println!("Logged in as {}", account.name);
        }
        Command::Users => {
            let current = config.current_user_name.as_deref();
            for account in db.list_accounts().await? {
                if Some(account.name.as_str()) == current {
                    println!("* {} (current)", account.name);
                } else {
                    println!("* {}", account.name);
                }
            }
        }
        Command::Reset => {
            let removed = db.reset().await?;
            println!("Removed {} accounts and everything they owned", removed);
        }
        Command::Addfeed { name, url } => {
            let session = Session::resolve(&db, &config).await?;
            let feed = db.create_feed(session.account(), &name, &url).await?;
            println!("Feed {} created with ID {}", feed.name, feed.id);
            println!("{} is now following {}", session.account().name, feed.name);
        }
        Command::Feeds => {
            for entry in db.list_feeds().await? {
                println!("{}", entry.feed.name);
                println!("  url: {}", entry.feed.url);
                println!("  created by: {}", entry.creator_name);
            }
        }
        Command::Follow { url } => {
            let session = Session::resolve(&db, &config).await?;
            let follow = db.follow(session.account(), &url).await?;
            println!("{} is now following {}", follow.account_name, follow.feed_name);
        }
        Command::Following => {
            let session = Session::resolve(&db, &config).await?;
            let feeds = db.list_following(session.account()).await?;
            println!("{} is following:", session.account().name);
            if feeds.is_empty() {
                println!("(empty)");
            }
            for name in feeds {
                println!("- {}", name);
            }
        }
        Command::Unfollow { url } => {
            let session = Session::resolve(&db, &config).await?;
            let feed = db.get_feed_by_url(&url).await?;
            if db.unfollow(session.account(), &url).await? {
                println!("{} is no longer following {}", session.account().name, feed.name);
            } else {
                println!("{} was not following {}", session.account().name, feed.name);
            }
        }
        Command::Browse { limit } => {
            let session = Session::resolve(&db, &config).await?;
            let limit = resolve_browse_limit(limit.as_deref());
            for entry in db.browse(session.account(), limit).await? {
                let post = entry.post;
                println!("*****");
                println!("  title: {}", post.title.as_deref().unwrap_or("(untitled)"));
                println!("  url: {}", post.url);
                if let Some(description) = post.description.as_deref() {
                    println!("  description: {}", description);
                }
                println!("  published: {}", post.published_at.to_rfc2822());
                println!("  feed: {}", entry.feed_name);
            }
        }
        Command::Agg { interval } => {
            let interval = parse_tick_interval(&interval)?;
            let client = build_client(&config.user_agent)?;
            let scheduler = Scheduler::new(db, client, config.fetch_options());

            println!(
                "Collecting feeds every {}",
                humantime::format_duration(interval)
            );
            tokio::select! {
                result = scheduler.run_forever(interval) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping scheduler");
                }
            }
        }
    }

    Ok(())
}

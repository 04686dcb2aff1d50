use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use emlfeed::config::Config;
use emlfeed::importer::{ImportOptions, Importer};
use emlfeed::message::InputKind;
use emlfeed::storage::{Database, DatabaseError};
use emlfeed::sync::RetryPolicy;

const AFTER_HELP: &str = "\
Examples:
  emlfeed --dburl reader.db --user john --feed https://example.com/rss.xml /path/to/rss.eml
  emlfeed --dburl reader.db --user john --feedmap feeds.txt /path/to/directory/with/emls
  emlfeed --dburl reader.db --user john --feed https://example.com/rss.xml --dump entries.json --dry /path/to/emls
  emlfeed --dburl reader.db entries.json

FEED MAP
  A feed map routes messages in a directory to several feeds. Empty lines
  and lines starting with # are ignored. Each rule reads:
    substring-of-entry-URL => feed-URL|none
  Rules are tried top to bottom and the first match wins. Entries routed to
  'none' are skipped without a warning.

  Example:
    # xkcd entries go to the xkcd feed
    xkcd.com => https://xkcd.com/rss.xml
    devblogs.technet.com => https://devblogs.microsoft.com/visualstudio/feed/
    # the scheme keeps this from matching devblogs.technet.com
    http://blogs.technet.com => none

TROUBLESHOOT
  'cannot find feed for entry URL' means no rule matched; add one to the
  feed map or use --feed.
  'Schema version mismatch' means the database was created by a different
  version; run the reader's migrations first.
  'batch failed after N attempts' usually means an unstable connection;
  raise --retries.";

#[derive(Parser, Debug)]
#[command(
    name = "emlfeed",
    version,
    about = "Import archived feed-article EML files into a feed reader database",
    after_help = AFTER_HELP
)]
struct Args {
    /// Database URL or path (sqlite:reader.db, /var/lib/reader.db)
    #[arg(long, value_name = "URL")]
    dburl: Option<String>,

    /// Name of the user owning the entries (EML input)
    #[arg(long, value_name = "NAME")]
    user: Option<String>,

    /// URL of the feed receiving every entry
    #[arg(long, value_name = "URL")]
    feed: Option<String>,

    /// Feed map file routing entries to feeds by URL
    #[arg(long, value_name = "FILE")]
    feedmap: Option<PathBuf>,

    /// Mark the imported entries as read
    #[arg(long)]
    mark: bool,

    /// Overwrite entries already stored with the same hash
    #[arg(long)]
    update: bool,

    /// Remove stored entries with matching user and hash before inserting
    #[arg(long)]
    remove: bool,

    /// Entries committed per transaction [default: 1000]
    #[arg(long, value_name = "N")]
    batch: Option<usize>,

    /// Attempts per transaction [default: 10]
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Build entries without touching the database
    #[arg(long)]
    dry: bool,

    /// Suppress warnings about unmatched or broken messages
    #[arg(long)]
    quiet: bool,

    /// Write the built entries to a JSON file
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// Config file [default: ~/.config/emlfeed/config.toml]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Create the database schema if missing
    #[arg(long)]
    init_db: bool,

    /// EML file, directory of EML files, or JSON dump
    input: Option<PathBuf>,
}

/// Validated run parameters.
struct Settings {
    database_url: SecretString,
    init_db: bool,
    import: Option<ImportOptions>,
}

/// Merge flags over the config file and check they describe a runnable
/// import. Errors are usage errors.
fn settings(args: Args, config: Config) -> Result<Settings, String> {
    let database_url = args
        .dburl
        .or(config.database_url)
        .filter(|url| !url.trim().is_empty())
        .ok_or("database URL is not specified")?;

    let Some(input) = args.input else {
        if args.init_db {
            return Ok(Settings {
                database_url: SecretString::from(database_url),
                init_db: true,
                import: None,
            });
        }
        return Err("EML file is not specified".to_string());
    };
    let kind = InputKind::detect(&input).map_err(|e| e.to_string())?;

    let batch_size = args.batch.unwrap_or(config.batch_size);
    if batch_size < 1 {
        return Err("batch size must be positive".to_string());
    }
    let retries = args.retries.unwrap_or(config.retries);
    if retries < 1 {
        return Err("retries amount must be positive".to_string());
    }

    if args.dry && (args.update || args.remove) {
        println!("Options '--update' and '--remove' do not have effect when '--dry' is specified.");
    }

    let (username, feed_url, feed_map) = if kind.needs_feed() {
        let username = args
            .user
            .filter(|u| !u.is_empty())
            .ok_or("user must be specified")?;
        let feed = args.feed.filter(|f| !f.is_empty());
        match (&feed, &args.feedmap) {
            (None, None) => return Err("feed URL or feed map file should be specified".to_string()),
            (Some(_), Some(_)) => {
                return Err("feed URL and feed map file cannot be specified together".to_string())
            }
            _ => {}
        }
        (Some(username), feed, args.feedmap)
    } else {
        (None, None, None)
    };

    Ok(Settings {
        database_url: SecretString::from(database_url),
        init_db: args.init_db,
        import: Some(ImportOptions {
            input,
            kind,
            username,
            feed_url,
            feed_map,
            mark_read: args.mark,
            update: args.update,
            remove: args.remove,
            dry_run: args.dry,
            quiet: args.quiet || config.quiet,
            dump: args.dump,
            batch_size,
            retry: RetryPolicy::new(retries, Duration::from_secs(config.retry_delay_secs)),
        }),
    })
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path.cloned().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("cannot load config '{}'", path.display())),
        None => Ok(Config::default()),
    }
}

async fn run(settings: Settings) -> Result<()> {
    let db = Database::open(settings.database_url.expose_secret())
        .await
        .map_err(|e| match e {
            DatabaseError::InstanceLocked => anyhow::anyhow!(
                "the database is locked by another process, close it and try again"
            ),
            e => anyhow::Error::new(e).context("unable to initialize database connection pool"),
        })?;
    db.ping()
        .await
        .context("unable to connect to the database")?;

    if settings.init_db {
        db.create_schema()
            .await
            .context("cannot create database schema")?;
        println!("Database schema ready.");
    }
    db.check_schema().await?;

    let Some(options) = settings.import else {
        return Ok(());
    };

    let (progress_tx, mut progress_rx) = mpsc::channel::<(usize, usize)>(32);
    let printer = tokio::spawn(async move {
        while let Some((processed, _total)) = progress_rx.recv().await {
            println!("Processed entries (DB): {}", processed);
        }
    });

    let result = Importer::new(&db, options)
        .with_progress(progress_tx)
        .run()
        .await;
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Progress printer stopped");
    }

    let summary = result?;
    tracing::info!(
        removed = summary.removed,
        processed = summary.sync.processed,
        inserted = summary.sync.inserted,
        updated = summary.sync.updated,
        "Run complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let usage_error = e.use_stderr();
            let _ = e.print();
            return if usage_error {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Wrong command line: {:#}", e);
            return ExitCode::from(1);
        }
    };

    let settings = match settings(args, config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Wrong command line: {}", e);
            eprintln!("{}", Args::command().render_help());
            return ExitCode::from(1);
        }
    };

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed: {:#}", e);
            ExitCode::from(2)
        }
    }
}

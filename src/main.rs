//! couchcache
//!
//! Command-line driver for the Couchbase cache adapter. Each invocation
//! starts the adapter, runs one operation and stops it again.
//!
//! ```text
//! couchcache --location 10.0.0.1:8091 --bucket sessions set users 42 '{"name":"ada"}' --ttl 60000
//! couchcache --location 10.0.0.1:8091 --bypass get users 42
//! couchcache validate-segment "bad segment"
//! ```
//!
//! `--mock` uses an in-process store that lives only for one invocation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use couchcache::{AdapterOptions, CacheEngine, CacheKey, CouchbaseCache, Error, Location, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Couchbase cache adapter - segment/id keyed cache entries in a Couchbase bucket
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Options file (YAML or JSON, camelCase keys)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store endpoint(s), repeatable or comma separated
    #[arg(long, global = true, env = "COUCHCACHE_LOCATION", value_delimiter = ',')]
    location: Vec<String>,

    /// Bucket name
    #[arg(long, global = true, env = "COUCHCACHE_BUCKET")]
    bucket: Option<String>,

    /// Key partition ("NONE" disables it)
    #[arg(long, global = true, env = "COUCHCACHE_PARTITION")]
    partition: Option<String>,

    /// Store username
    #[arg(long, global = true, env = "COUCHCACHE_USERNAME")]
    username: Option<String>,

    /// Store password
    #[arg(long, global = true, env = "COUCHCACHE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true)]
    connection_timeout: Option<u64>,

    /// Operation timeout in milliseconds
    #[arg(long, global = true)]
    operation_timeout: Option<u64>,

    /// Treat connection failures as misses
    #[arg(long, global = true)]
    bypass: bool,

    /// Use the in-process mock store (discarded when the command exits)
    #[arg(long, global = true)]
    mock: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch an entry and print its envelope as JSON
    Get { segment: String, id: String },

    /// Store a value (parsed as JSON, otherwise stored as a string)
    Set {
        segment: String,
        id: String,
        value: String,
        /// Time to live in milliseconds
        #[arg(long, default_value = "60000")]
        ttl: i64,
    },

    /// Remove an entry
    Drop { segment: String, id: String },

    /// Check whether a segment name is acceptable
    ValidateSegment { name: String },

    /// Connect to the store and report readiness
    Ping,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let options = build_options(&args)?;
    debug!(
        locations = ?options.locations(),
        bucket = options.bucket_name(),
        partition = ?options.partition(),
        mock = options.flags.is_mock,
        "Resolved adapter options"
    );

    let cache = CouchbaseCache::new(options);

    if let Command::ValidateSegment { name } = &args.command {
        cache.validate_segment_name(name)?;
        println!("ok");
        return Ok(());
    }

    info!("Starting couchcache {}", couchcache::VERSION);
    cache.start().await?;

    let outcome = run(&cache, &args.command).await;

    cache.stop();
    debug!(stats = ?cache.stats(), "Adapter counters");
    outcome
}

async fn run(cache: &CouchbaseCache, command: &Command) -> Result<()> {
    match command {
        Command::Get { segment, id } => {
            let envelope = cache.get(&CacheKey::new(segment, id)).await?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Command::Set {
            segment,
            id,
            value,
            ttl,
        } => {
            let item = serde_json::from_str::<serde_json::Value>(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            cache.set(&CacheKey::new(segment, id), &item, *ttl).await?;
            println!("ok");
        }
        Command::Drop { segment, id } => {
            cache.drop(&CacheKey::new(segment, id)).await?;
            println!("ok");
        }
        Command::Ping => {
            println!(
                "{} bucket '{}' ready: {}",
                cache.options().locations().join(","),
                cache.options().bucket_name(),
                cache.is_ready()
            );
        }
        Command::ValidateSegment { .. } => {}
    }
    Ok(())
}

// =============================================================================
// Options
// =============================================================================

fn build_options(args: &Args) -> Result<AdapterOptions> {
    let mut options = match &args.config {
        Some(path) => AdapterOptions::from_file(path)?,
        None => AdapterOptions::default(),
    };

    if !args.location.is_empty() {
        options.location = Some(Location::Many(args.location.clone()));
    }
    if args.bucket.is_some() {
        options.bucket = args.bucket.clone();
    }
    if args.partition.is_some() {
        options.partition = args.partition.clone();
    }
    if args.username.is_some() {
        options.username = args.username.clone();
    }
    if args.password.is_some() {
        options.password = args.password.clone();
    }
    if args.connection_timeout.is_some() {
        options.connection_timeout = args.connection_timeout;
    }
    if args.operation_timeout.is_some() {
        options.operation_timeout = args.operation_timeout;
    }
    options.flags.bypass_cache_on_conn_error |= args.bypass;
    options.flags.is_mock |= args.mock;

    Ok(options)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| {
        d.parse::<Directive>()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("reqwest=warn")?)
        .add_directive(directive("hyper=warn")?);

    // Logs go to stderr so command output stays parseable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

//! Command-line client entry point.
//!
//! This module handles:
//! * Command line argument parsing
//! * Logging configuration
//! * Configuration loading and merging with flags
//! * The send / receive / version / config / ping subcommands
//!
//! # Runtime Behavior
//!
//! The client:
//! 1. Merges persisted configuration with command-line overrides
//! 2. Runs the requested transfer on the Tokio runtime
//! 3. Renders transfer progress as an in-place stderr meter
//! 4. Exits 0 on success and 1 on any error
//!
//! # Error Handling
//!
//! Every failure surfaces as a typed error from the library; this layer
//! only decides how to present it and what exit code to use. The one
//! interactive case is a receive into an existing file, which prompts
//! before retrying with overwrite enabled.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{error, warn, LevelFilter};

use secretshare::{
    client::Client,
    config,
    error::{Error, ErrorKind, Result},
    key::TransferKey,
    progress::{ProgressSink, SharedSink},
    protocol,
};

/// Group name for mutually exclusive logging options.
///
/// Used by clap to ensure -q (quiet) and -v (verbose) flags
/// cannot be used together.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
///
/// The connection settings can also come from the persisted
/// configuration file or from environment variables with the
/// `SECRETSHARE_` prefix; explicit flags win.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the secretshare broker
    #[arg(long, global = true, value_hint = ValueHint::Url, env = "SECRETSHARE_ENDPOINT")]
    endpoint: Option<String>,

    /// Name of the bucket shares are stored in
    #[arg(long, global = true, env = "SECRETSHARE_BUCKET")]
    bucket: Option<String>,

    /// Region of the share bucket
    #[arg(long = "bucket-region", global = true, env = "SECRETSHARE_BUCKET_REGION")]
    bucket_region: Option<String>,

    /// Suppress all output except warnings and errors
    #[arg(short, long, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Use -v for debug logging
    /// Use -vv for trace logging
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Encrypt and upload a file, printing the key to share
    Send {
        /// File to share
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Blob lifetime in minutes
        #[arg(long, default_value_t = 240)]
        ttl: i64,
    },

    /// Download and decrypt a shared file
    Receive {
        /// Transfer key received from the sender
        key: String,

        /// Destination directory or file path
        #[arg(short, long, value_hint = ValueHint::AnyPath)]
        output: Option<PathBuf>,

        /// Overwrite an existing destination without prompting
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show client and server versions
    Version,

    /// Update the persisted configuration
    ///
    /// The connection flags (--endpoint, --bucket, --bucket-region) are
    /// written to ~/.secretsharerc when given.
    Config {
        /// Shared authorization key, written to ~/.secretshare.key
        #[arg(long)]
        auth_key: Option<String>,
    },

    /// Check that the configured broker is reachable
    Ping,
}

/// Initialize logging system.
///
/// Configures logging based on command line arguments and environment:
/// * `-q` sets Warning level
/// * `-v` sets Debug level
/// * `-vv` sets Trace level
/// * `RUST_LOG` environment variable provides defaults
///
/// # Panics
///
/// Panics if logger is already initialized.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose` is 0
            // by default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::max(),
        };
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

/// Dispatches the parsed subcommand.
async fn run(args: Args) -> Result<()> {
    match args.command.clone() {
        Command::Send { file, ttl } => send(&args, &file, ttl).await,
        Command::Receive { key, output, yes } => receive(&args, &key, output, yes).await,
        Command::Version => version(&args).await,
        Command::Config { auth_key } => update_config(&args, auth_key),
        Command::Ping => ping(&args).await,
    }
}

async fn send(args: &Args, file: &Path, ttl: i64) -> Result<()> {
    let cfg = resolve_config(args)?;
    let auth_key = config::load_auth_key()?.ok_or_else(|| {
        Error::unauthorized(
            "no auth key configured; set one with `secretshare config --auth-key`",
        )
    })?;

    let client = Client::new(
        &cfg.endpoint_base_url,
        &cfg.bucket,
        &cfg.bucket_region,
        &auth_key,
    )?;

    let progress = meter(args.quiet);
    let receipt = client.send(file, ttl, progress.clone()).await?;
    finish_meter(progress.is_some());

    println!("Key:       {}", receipt.key);
    println!("Object ID: {}", receipt.object_id);
    println!();
    println!("To receive this file, run:");
    println!("  secretshare receive {}", receipt.key);
    Ok(())
}

async fn receive(args: &Args, key: &str, output: Option<PathBuf>, yes: bool) -> Result<()> {
    let cfg = resolve_config(args)?;
    let key: TransferKey = key.parse()?;

    // --output may name the destination directory or the full file path.
    let (dest_dir, new_name) = match output {
        Some(path) if path.is_dir() => (path, None),
        Some(path) => {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(String::from);
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (dir, name)
        }
        None => (PathBuf::from("."), None),
    };

    let client = Client::new(&cfg.endpoint_base_url, &cfg.bucket, &cfg.bucket_region, "")?;
    let progress = meter(args.quiet);

    let result = client
        .receive(&key, &dest_dir, new_name.as_deref(), yes, progress.clone())
        .await;
    let filemeta = match result {
        Err(e) if e.kind == ErrorKind::RecvFileExists => {
            if !confirm_overwrite(&e)? {
                return Err(e);
            }
            client
                .receive(&key, &dest_dir, new_name.as_deref(), true, progress.clone())
                .await?
        }
        other => other?,
    };
    finish_meter(progress.is_some());

    println!("Received {} ({} bytes)", filemeta.filename, filemeta.filesize);
    Ok(())
}

async fn version(args: &Args) -> Result<()> {
    println!(
        "secretshare client {} (API version {})",
        env!("CARGO_PKG_VERSION"),
        protocol::API_VERSION
    );

    // Server details are best-effort: version must work unconfigured.
    if let Ok(cfg) = resolve_config(args) {
        let client = Client::new(&cfg.endpoint_base_url, &cfg.bucket, &cfg.bucket_region, "")?;
        match client.version().await {
            Ok(server) => {
                println!(
                    "server {} at {} (API version {}, source at {})",
                    server.server_version,
                    cfg.endpoint_base_url,
                    server.api_version,
                    server.server_source_location
                );
            }
            Err(e) => warn!("could not reach the server: {e}"),
        }
    }
    Ok(())
}

fn update_config(args: &Args, auth_key: Option<String>) -> Result<()> {
    let mut cfg = config::Config::load()?.unwrap_or_default();

    let mut changed = false;
    if let Some(endpoint) = &args.endpoint {
        cfg.endpoint_base_url = endpoint.clone();
        changed = true;
    }
    if let Some(bucket) = &args.bucket {
        cfg.bucket = bucket.clone();
        changed = true;
    }
    if let Some(region) = &args.bucket_region {
        cfg.bucket_region = region.clone();
        changed = true;
    }

    if changed {
        cfg.save()?;
        println!("Wrote {}", config::rc_path()?.display());
    }
    if let Some(key) = auth_key {
        config::save_auth_key(&key)?;
        println!("Wrote {}", config::key_path()?.display());
    } else if !changed {
        println!("Endpoint:      {}", cfg.endpoint_base_url);
        println!("Bucket:        {}", cfg.bucket);
        println!("Bucket region: {}", cfg.bucket_region);
    }
    Ok(())
}

async fn ping(args: &Args) -> Result<()> {
    let cfg = resolve_config(args)?;
    let client = Client::new(&cfg.endpoint_base_url, &cfg.bucket, &cfg.bucket_region, "")?;
    let server = client.version().await?;

    if server.api_version != protocol::API_VERSION {
        warn!(
            "server speaks API version {}, this client speaks {}",
            server.api_version,
            protocol::API_VERSION
        );
    }
    println!(
        "{} is alive (server version {}, API version {})",
        cfg.endpoint_base_url, server.server_version, server.api_version
    );
    Ok(())
}

/// Merges the persisted configuration with command-line overrides.
fn resolve_config(args: &Args) -> Result<config::Config> {
    let stored = config::Config::load()?.unwrap_or_default();
    let merged = config::Config {
        endpoint_base_url: args
            .endpoint
            .clone()
            .unwrap_or(stored.endpoint_base_url),
        bucket: args.bucket.clone().unwrap_or(stored.bucket),
        bucket_region: args.bucket_region.clone().unwrap_or(stored.bucket_region),
    };

    let mut missing = Vec::new();
    if merged.endpoint_base_url.is_empty() {
        missing.push("endpointBaseUrl");
    }
    if merged.bucket.is_empty() {
        missing.push("bucket");
    }
    if merged.bucket_region.is_empty() {
        missing.push("bucket_region");
    }
    if !missing.is_empty() {
        return Err(Error::file_access(format!(
            "the following required options are missing from your .secretsharerc file: {}; \
             set them with `secretshare config`",
            missing.join(", ")
        )));
    }
    Ok(merged)
}

/// In-place stderr progress meter.
struct Meter;

impl ProgressSink for Meter {
    fn update(&self, transferred: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = transferred.saturating_mul(100) / total;
        eprint!("\r{percent:>3}% ({transferred}/{total} bytes)");
        let _ = io::stderr().flush();
    }
}

fn meter(quiet: bool) -> Option<SharedSink> {
    if quiet {
        return None;
    }
    let sink: SharedSink = Arc::new(Meter);
    Some(sink)
}

/// Terminates the meter line so regular output starts on a fresh line.
fn finish_meter(active: bool) {
    if active {
        eprintln!();
    }
}

/// Asks the user whether an existing destination should be replaced.
fn confirm_overwrite(err: &Error) -> Result<bool> {
    let Some(filemeta) = err.metadata() else {
        return Ok(false);
    };

    eprintln!("{err}");
    eprint!(
        "Remote file is {:?} ({} bytes). Overwrite? [y/N] ",
        filemeta.filename, filemeta.filesize
    );
    io::stderr().flush().map_err(Error::file_access)?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .map_err(Error::file_access)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "Yes" | "YES"))
}

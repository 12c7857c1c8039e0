//! Broker service entry point.
//!
//! Loads the server configuration, builds the SigV4 presigner from the
//! conventional AWS environment variables, and serves the broker until
//! shutdown.
//!
//! # Configuration
//!
//! A JSON file (default `/etc/secretshare-server.json`):
//!
//! ```json
//! {
//!     "addr": "0.0.0.0",
//!     "port": 8080,
//!     "bucket": "shares",
//!     "bucket_region": "us-west-1",
//!     "secret_key": "shared auth secret"
//! }
//! ```
//!
//! The `SECRETSHARE_AUTH_KEY` environment variable overrides the
//! configured secret; `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
//! provide the signing credentials.

use std::{env, fs, process, sync::Arc};

use clap::{command, Parser, ValueHint};
use log::{error, info, LevelFilter};

use secretshare::{
    broker::{self, BrokerConfig},
    error::{Error, Result},
    protocol,
    s3::S3Minter,
};

/// Config file used when none is given.
const DEFAULT_CONFIG_PATH: &str = "/etc/secretshare-server.json";

/// Environment variable overriding the configured auth secret.
const AUTH_KEY_ENV_VAR: &str = "SECRETSHARE_AUTH_KEY";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        value_hint = ValueHint::FilePath,
        default_value_t = String::from(DEFAULT_CONFIG_PATH)
    )]
    config: String,

    /// Suppress all output except warnings and errors
    #[arg(short, long, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initialize logging system.
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
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::max(),
        };
        logger.filter_module("secretshare", level);
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

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)?;
    let minter = Arc::new(S3Minter::from_env(&config.bucket_region)?);

    info!(
        "secretshare broker {} (server version {}, API version {})",
        env!("CARGO_PKG_VERSION"),
        protocol::SERVER_VERSION,
        protocol::API_VERSION
    );
    info!(
        "minting URLs for bucket {} in {}",
        config.bucket, config.bucket_region
    );

    broker::serve(config, minter).await
}

/// Loads and validates the server configuration file.
fn load_config(path: &str) -> Result<BrokerConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::file_access(format!("failed to read config file {path}: {e}")))?;
    let mut config: BrokerConfig = serde_json::from_str(&contents)
        .map_err(|e| Error::file_access(format!("config file {path} is not valid JSON: {e}")))?;

    if let Ok(secret) = env::var(AUTH_KEY_ENV_VAR) {
        if !secret.is_empty() {
            config.secret_key = secret;
        }
    }

    if config.secret_key.is_empty() {
        return Err(Error::file_access(format!(
            "no auth secret configured; set secret_key in {path} or {AUTH_KEY_ENV_VAR}"
        )));
    }
    if config.bucket.is_empty() || config.bucket_region.is_empty() {
        return Err(Error::file_access(format!(
            "bucket and bucket_region must be set in {path}"
        )));
    }
    if config.port == 0 {
        return Err(Error::file_access(format!("port must be set in {path}")));
    }

    Ok(config)
}

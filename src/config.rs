//! Persisted client configuration and authentication.
//!
//! This module handles the two files secretshare keeps in the user's home
//! directory:
//!
//! * `.secretsharerc` — JSON with the broker endpoint and the bucket the
//!   broker serves (`endpointBaseUrl`, `bucket_region`, `bucket`);
//! * `.secretshare.key` — the raw shared authorization secret, trailing
//!   whitespace trimmed on read.
//!
//! Both files are written with mode `0600`. The `SECRETSHARE_KEY`
//! environment variable overrides the key file when set.
//!
//! # Example
//!
//! ```rust
//! use secretshare::config::Config;
//!
//! if let Some(config) = Config::load()? {
//!     println!("sending through {}", config.endpoint_base_url);
//! }
//! ```

use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the persisted auth key.
pub const KEY_ENV_VAR: &str = "SECRETSHARE_KEY";

/// Name of the configuration file under the home directory.
const RC_FILE: &str = ".secretsharerc";

/// Name of the auth-key file under the home directory.
const KEY_FILE: &str = ".secretshare.key";

/// Upper bound on config/key file sizes.
///
/// Both files are tiny; anything larger is not ours.
const MAX_FILE_SIZE: u64 = 4096;

/// Client configuration persisted in `.secretsharerc`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Config {
    /// Base URL of the broker, without the trailing endpoint path.
    #[serde(rename = "endpointBaseUrl")]
    pub endpoint_base_url: String,

    /// Region of the bucket the broker serves.
    pub bucket_region: String,

    /// Name of the bucket the broker serves.
    pub bucket: String,
}

impl Config {
    /// Loads the configuration file, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Option<Self>> {
        let path = rc_path()?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = read_small_file(&path)?;
        let config = serde_json::from_str(&contents).map_err(|e| {
            Error::file_access(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        Ok(Some(config))
    }

    /// Writes the configuration file with mode `0600`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory is unknown or the file
    /// cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = rc_path()?;
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| Error::internal(e.to_string()))?;
        write_private_file(&path, contents.as_bytes())
    }
}

/// Loads the shared authorization secret.
///
/// The `SECRETSHARE_KEY` environment variable takes precedence; otherwise
/// the key file is read with trailing whitespace trimmed. Returns `None`
/// when neither source is present.
///
/// # Errors
///
/// Returns an error if the key file exists but cannot be read.
pub fn load_auth_key() -> Result<Option<String>> {
    if let Ok(key) = env::var(KEY_ENV_VAR) {
        if !key.is_empty() {
            return Ok(Some(key));
        }
    }

    let path = key_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let contents = read_small_file(&path)?;
    Ok(Some(contents.trim_end().to_string()))
}

/// Writes the shared authorization secret with mode `0600`.
///
/// # Errors
///
/// Returns an error if the home directory is unknown or the file cannot
/// be written.
pub fn save_auth_key(key: &str) -> Result<()> {
    let path = key_path()?;
    write_private_file(&path, key.as_bytes())
}

/// Path of the configuration file.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn rc_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(RC_FILE))
}

/// Path of the auth-key file.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn key_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(KEY_FILE))
}

fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| Error::file_access("cannot determine the home directory"))
}

/// Reads a file that should be small.
///
/// The size cap prevents accidentally slurping something huge that ended
/// up at a config path.
fn read_small_file(path: &Path) -> Result<String> {
    let attributes = fs::metadata(path).map_err(Error::file_access)?;
    let file_size = attributes.len();
    if file_size > MAX_FILE_SIZE {
        return Err(Error::file_access(format!(
            "{} too large: {file_size} bytes",
            path.display()
        )));
    }
    fs::read_to_string(path).map_err(Error::file_access)
}

/// Creates or replaces a file readable only by the owner.
fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(Error::file_access)?;
    file.write_all(contents).map_err(Error::file_access)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let config = Config {
            endpoint_base_url: "https://broker.example.com".to_string(),
            bucket_region: "us-west-1".to_string(),
            bucket: "shares".to_string(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("endpointBaseUrl"));
        assert!(json.contains("bucket_region"));
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}

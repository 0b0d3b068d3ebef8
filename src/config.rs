use std::{path::PathBuf, time::Duration};

use crate::error::AppError;

/// The only remote host whose SSH stanza is managed
pub const HOST_ALIAS: &str = "github.com";
/// Directory under home holding the account store
const DATA_DIR_NAME: &str = ".git-hyper";
/// Account store file name inside the data directory
const STORE_FILE: &str = "accounts.json";
/// Probe timeout used when none is configured
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Resolved locations and knobs for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding `accounts.json`
    pub data_dir: PathBuf,
    /// Directory holding the ssh client config and generated keys
    pub ssh_dir: PathBuf,
    /// Remote host whose stanza is owned
    pub host_alias: String,
    /// Upper bound on a connectivity probe
    pub probe_timeout: Duration,
}

impl Settings {
    /// Builds settings from optional overrides, falling back to the home directory
    ///
    /// # Arguments
    /// * `data_dir` - Override for the account store directory
    /// * `ssh_dir` - Override for the ssh directory
    /// * `probe_timeout_secs` - Override for the probe timeout
    pub fn resolve(
        data_dir: Option<PathBuf>,
        ssh_dir: Option<PathBuf>,
        probe_timeout_secs: Option<u64>,
    ) -> Result<Self, AppError> {
        let home = || {
            dirs::home_dir().ok_or_else(|| {
                AppError::Validation("failed to find the home directory".to_string())
            })
        };

        let data_dir = match data_dir {
            Some(dir) => dir,
            None => home()?.join(DATA_DIR_NAME),
        };
        let ssh_dir = match ssh_dir {
            Some(dir) => dir,
            None => home()?.join(".ssh"),
        };

        Ok(Self {
            data_dir,
            ssh_dir,
            host_alias: HOST_ALIAS.to_string(),
            probe_timeout: Duration::from_secs(
                probe_timeout_secs.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
            ),
        })
    }

    /// Path to the account store document
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Directory next to the data directory holding backup archives
    pub fn backup_dir(&self) -> PathBuf {
        let name = self
            .data_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "git-hyper".to_string());
        self.data_dir.with_file_name(format!("{name}-backups"))
    }

    /// Path to the ssh client config file
    pub fn ssh_config_path(&self) -> PathBuf {
        self.ssh_dir.join("config")
    }
}

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored Git/GitHub identity
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Store-assigned id, never reused
    pub id: u64,
    /// Git username (user.name)
    pub display_name: String,
    /// Git email address (user.email)
    pub email: String,
    /// Private key dedicated to this account; the public key sits next to it
    pub key_path: PathBuf,
    /// At most one record in the store has this set
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Path of the public half of this account's keypair
    pub fn public_key_path(&self) -> PathBuf {
        public_key_path(&self.key_path)
    }
}

/// Appends `.pub` to a private key path
pub fn public_key_path(key_path: &Path) -> PathBuf {
    let mut path = key_path.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

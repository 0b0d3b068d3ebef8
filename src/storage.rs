//! Account store
//!
//! Accounts live in a single JSON document. Every mutation rewrites the
//! whole document through a staged temp file and a rename, so the active
//! flag moves from one record to another in one durable step.

use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    account::AccountRecord,
    error::AppError,
    validation::{validate_display_name, validate_email, validate_key_path},
};

/// Current on-disk document version
const STORE_VERSION: u32 = 1;

/// On-disk layout of the account store
#[derive(Serialize, Deserialize, Debug)]
struct StoreFile {
    version: u32,
    /// Next id to hand out; ids are never reused
    next_id: u64,
    /// Records in creation order
    accounts: Vec<AccountRecord>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            next_id: 1,
            accounts: Vec::new(),
        }
    }
}

/// Durable table of account records
#[derive(Debug, Clone)]
pub struct AccountStore {
    path: PathBuf,
}

impl AccountStore {
    /// Opens the store backed by `path`; the file is created on first write
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Gets the path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document; a missing file is an empty store
    fn load(&self) -> Result<StoreFile, AppError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => {
                return Err(AppError::Store(format!(
                    "cannot read '{}': {e}",
                    self.path.display()
                )));
            }
        };

        if contents.trim().is_empty() {
            return Ok(StoreFile::default());
        }

        let mut file: StoreFile = serde_json::from_str(&contents).map_err(|e| {
            AppError::Store(format!("'{}' is corrupt: {e}", self.path.display()))
        })?;

        if file.version > STORE_VERSION {
            return Err(AppError::Store(format!(
                "store version {} is newer than supported {}",
                file.version, STORE_VERSION
            )));
        }

        let active = file.accounts.iter().filter(|a| a.is_active).count();
        if active > 1 {
            tracing::warn!(
                "{} active accounts found in '{}', clearing all active flags",
                active,
                self.path.display()
            );
            for account in &mut file.accounts {
                account.is_active = false;
            }
        }

        // Guard against a hand-edited next_id that would reuse an id
        let max_id = file.accounts.iter().map(|a| a.id).max().unwrap_or(0);
        file.next_id = file.next_id.max(max_id + 1);

        Ok(file)
    }

    /// Writes the document to a temp file in the same directory and renames it into place
    fn save(&self, file: &StoreFile) -> Result<(), AppError> {
        let store_err =
            |e: std::io::Error| AppError::Store(format!("cannot write '{}': {e}", self.path.display()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(store_err)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(file)?;

        let mut temp = File::create(&temp_path).map_err(store_err)?;
        temp.write_all(json.as_bytes()).map_err(store_err)?;
        temp.sync_all().map_err(store_err)?;

        fs::rename(&temp_path, &self.path).map_err(store_err)?;
        tracing::debug!("saved {} accounts to {}", file.accounts.len(), self.path.display());
        Ok(())
    }

    /// Adds a new, inactive account; name and email are stored trimmed
    ///
    /// # Arguments
    /// * `display_name` - Git user.name
    /// * `email` - Git user.email
    /// * `key_path` - Absolute path of the account's private key
    pub fn add(
        &self,
        display_name: &str,
        email: &str,
        key_path: &Path,
    ) -> Result<AccountRecord, AppError> {
        let mut file = self.load()?;
        let display_name = display_name.trim();
        let email = email.trim();

        validate_display_name(display_name)?;
        validate_email(email, &file.accounts, None)?;
        validate_key_path(key_path, &file.accounts)?;

        let record = AccountRecord {
            id: file.next_id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            key_path: key_path.to_path_buf(),
            is_active: false,
            created_at: Utc::now(),
        };
        file.next_id += 1;
        file.accounts.push(record.clone());

        self.save(&file)?;
        tracing::info!("added account {} <{}>", record.id, record.email);
        Ok(record)
    }

    /// Lists all accounts in creation order
    pub fn list(&self) -> Result<Vec<AccountRecord>, AppError> {
        Ok(self.load()?.accounts)
    }

    /// Gets one account by id
    pub fn get(&self, id: u64) -> Result<AccountRecord, AppError> {
        self.load()?
            .accounts
            .into_iter()
            .find(|account| account.id == id)
            .ok_or(AppError::NotFound(id))
    }

    /// Removes an account and returns it; removing the active one leaves none active
    pub fn remove(&self, id: u64) -> Result<AccountRecord, AppError> {
        let mut file = self.load()?;
        let index = file
            .accounts
            .iter()
            .position(|account| account.id == id)
            .ok_or(AppError::NotFound(id))?;

        let removed = file.accounts.remove(index);
        self.save(&file)?;
        tracing::info!("removed account {}", id);
        Ok(removed)
    }

    /// Gets the active account, if any
    pub fn get_active(&self) -> Result<Option<AccountRecord>, AppError> {
        Ok(self
            .load()?
            .accounts
            .into_iter()
            .find(|account| account.is_active))
    }

    /// Marks `id` active and every other account inactive in one write
    ///
    /// Returns the previously active account, if it was a different one.
    pub fn set_active(&self, id: u64) -> Result<Option<AccountRecord>, AppError> {
        let mut file = self.load()?;
        if !file.accounts.iter().any(|account| account.id == id) {
            return Err(AppError::NotFound(id));
        }

        let previous = file
            .accounts
            .iter()
            .find(|account| account.is_active && account.id != id)
            .cloned();

        for account in &mut file.accounts {
            account.is_active = account.id == id;
        }

        self.save(&file)?;
        tracing::info!("account {} is now active", id);
        Ok(previous)
    }

    /// Edits name and/or email of an account in place
    pub fn update(
        &self,
        id: u64,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> Result<AccountRecord, AppError> {
        let mut file = self.load()?;
        let display_name = display_name.map(str::trim);
        let email = email.map(str::trim);

        if let Some(name) = display_name {
            validate_display_name(name)?;
        }
        if let Some(email) = email {
            validate_email(email, &file.accounts, Some(id))?;
        }

        let account = file
            .accounts
            .iter_mut()
            .find(|account| account.id == id)
            .ok_or(AppError::NotFound(id))?;

        if let Some(name) = display_name {
            account.display_name = name.to_string();
        }
        if let Some(email) = email {
            account.email = email.to_string();
        }
        let updated = account.clone();

        self.save(&file)?;
        Ok(updated)
    }
}

//! SSH client config merger
//!
//! The ssh config is a shared, hand-edited file. It is split into top-level
//! stanzas; the one stanza wrapped in git-hyper's marker comments is owned
//! and regenerated, every other byte is carried through untouched. The file
//! is handled as bytes since ssh itself does not require it to be UTF-8.

use std::{
    borrow::Cow,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use crate::{error::AppError, keys::create_private_dir};

/// First line of the owned stanza
pub const BEGIN_MARKER: &str = "# >>> git-hyper managed block >>>";
/// Last line of the owned stanza
pub const END_MARKER: &str = "# <<< git-hyper managed block <<<";

/// A top-level piece of the ssh config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    /// Anything not written by git-hyper, kept verbatim
    Opaque(Vec<u8>),
    /// The marker-delimited block git-hyper owns
    Owned(Vec<u8>),
}

impl Stanza {
    fn bytes(&self) -> &[u8] {
        match self {
            Stanza::Opaque(bytes) | Stanza::Owned(bytes) => bytes,
        }
    }
}

/// Parsed ssh config as an ordered list of stanzas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfigDocument {
    stanzas: Vec<Stanza>,
    line_ending: &'static str,
}

impl SshConfigDocument {
    /// Splits `content` into stanzas; concatenating them gives `content` back
    pub fn parse(content: &[u8]) -> Self {
        let line_ending = if content.windows(2).any(|pair| pair == b"\r\n") {
            "\r\n"
        } else {
            "\n"
        };
        let mut stanzas = Vec::new();
        let mut current: Option<Stanza> = None;
        // Whether the open owned stanza already had its Host line
        let mut owned_has_host = false;

        for line in content.split_inclusive(|byte| *byte == b'\n') {
            let decoded = decode(line);
            let trimmed = decoded.trim();

            if trimmed == BEGIN_MARKER {
                stanzas.extend(current.take());
                current = Some(Stanza::Owned(line.to_vec()));
                owned_has_host = false;
                continue;
            }

            match current.as_mut() {
                Some(Stanza::Owned(bytes)) => {
                    if starts_stanza(trimmed) {
                        if owned_has_host {
                            // Begin marker without an end marker stops at the next stanza
                            stanzas.extend(current.take());
                            current = Some(Stanza::Opaque(line.to_vec()));
                            continue;
                        }
                        owned_has_host = true;
                    }
                    bytes.extend_from_slice(line);
                    if trimmed == END_MARKER {
                        stanzas.extend(current.take());
                    }
                }
                Some(Stanza::Opaque(bytes)) => {
                    if starts_stanza(trimmed) {
                        stanzas.extend(current.take());
                        current = Some(Stanza::Opaque(line.to_vec()));
                    } else {
                        bytes.extend_from_slice(line);
                    }
                }
                None => current = Some(Stanza::Opaque(line.to_vec())),
            }
        }
        stanzas.extend(current);

        Self {
            stanzas,
            line_ending,
        }
    }

    /// Gets the stanzas in file order
    pub fn stanzas(&self) -> &[Stanza] {
        &self.stanzas
    }

    /// Number of owned stanzas; more than one means someone copied the block
    pub fn owned_count(&self) -> usize {
        self.stanzas
            .iter()
            .filter(|stanza| matches!(stanza, Stanza::Owned(_)))
            .count()
    }

    /// Number of opaque stanzas whose `Host` line names `host_alias`
    pub fn unmanaged_host_count(&self, host_alias: &str) -> usize {
        self.stanzas
            .iter()
            .filter(|stanza| match stanza {
                Stanza::Opaque(bytes) => host_patterns(bytes).iter().any(|p| p == host_alias),
                Stanza::Owned(_) => false,
            })
            .count()
    }

    /// `IdentityFile` of the (last) owned stanza
    pub fn owned_identity_file(&self) -> Option<PathBuf> {
        self.stanzas.iter().rev().find_map(|stanza| match stanza {
            Stanza::Owned(bytes) => decode(bytes).lines().find_map(|line| {
                let (key, value) = split_directive(line.trim())?;
                key.eq_ignore_ascii_case("identityfile")
                    .then(|| PathBuf::from(value.trim_matches('"')))
            }),
            Stanza::Opaque(_) => None,
        })
    }

    /// Drops every owned stanza and appends a freshly rendered one at the end
    pub fn replace_owned(&mut self, host_alias: &str, key_path: &Path) {
        let owned = self.owned_count();
        if owned > 1 {
            tracing::warn!(
                "found {} git-hyper blocks in ssh config, collapsing them into one",
                owned
            );
        }
        self.stanzas
            .retain(|stanza| matches!(stanza, Stanza::Opaque(_)));

        let line_ending = self.line_ending.as_bytes();
        if let Some(Stanza::Opaque(last)) = self.stanzas.last_mut() {
            if !last.ends_with(b"\n") {
                last.extend_from_slice(line_ending);
            }
        }
        // One blank line between the user's content and the block
        if !self.stanzas.is_empty() && !ends_with_blank_line(&self.render()) {
            if let Some(Stanza::Opaque(last)) = self.stanzas.last_mut() {
                last.extend_from_slice(line_ending);
            }
        }

        self.stanzas.push(Stanza::Owned(
            render_owned(host_alias, key_path, self.line_ending).into_bytes(),
        ));
    }

    /// Joins the stanzas back into file content
    pub fn render(&self) -> Vec<u8> {
        self.stanzas.iter().map(Stanza::bytes).collect::<Vec<_>>().concat()
    }
}

/// Lossy view of a line, used only to recognise directives
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Renders the owned stanza for `host_alias`
fn render_owned(host_alias: &str, key_path: &Path, line_ending: &str) -> String {
    let key = key_path.to_string_lossy();
    let key = if key.contains(char::is_whitespace) {
        format!("\"{key}\"")
    } else {
        key.into_owned()
    };

    [
        BEGIN_MARKER.to_string(),
        format!("Host {host_alias}"),
        format!("    HostName {host_alias}"),
        "    User git".to_string(),
        format!("    IdentityFile {key}"),
        "    IdentitiesOnly yes".to_string(),
        END_MARKER.to_string(),
    ]
    .iter()
    .map(|line| format!("{line}{line_ending}"))
    .collect()
}

/// Splits "Key Value" or "Key=Value"
fn split_directive(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (key, rest) = line.split_at(split_at);
    let value = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '=');
    Some((key, value.trim()))
}

/// True for `Host` and `Match` lines, which open a new stanza
fn starts_stanza(trimmed: &str) -> bool {
    split_directive(trimmed).is_some_and(|(key, _)| {
        key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("match")
    })
}

/// Patterns named on the first `Host` line of a stanza
fn host_patterns(bytes: &[u8]) -> Vec<String> {
    decode(bytes)
        .lines()
        .filter_map(|line| split_directive(line.trim()))
        .find(|(key, _)| key.eq_ignore_ascii_case("host"))
        .map(|(_, value)| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn ends_with_blank_line(bytes: &[u8]) -> bool {
    let Some(body) = bytes.strip_suffix(b"\n") else {
        return false;
    };
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    body.is_empty()
        || body
            .rsplit(|byte| *byte == b'\n')
            .next()
            .is_some_and(|last| last.iter().all(u8::is_ascii_whitespace))
}

/// Reads and rewrites the ssh client config, touching only the owned stanza
#[derive(Debug, Clone)]
pub struct SshConfigMerger {
    path: PathBuf,
}

impl SshConfigMerger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Gets the config file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Follows a symlinked config to the file that is actually written
    fn target(&self) -> Result<PathBuf, AppError> {
        match fs::symlink_metadata(&self.path) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                fs::canonicalize(&self.path).map_err(|e| AppError::config_access(&self.path, e))
            }
            _ => Ok(self.path.clone()),
        }
    }

    /// Reads the current config; a missing file reads as `None`
    fn read(&self, target: &Path) -> Result<Option<Vec<u8>>, AppError> {
        match fs::read(target) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::config_access(target, e)),
        }
    }

    /// Parses the current config; a missing file is an empty document
    pub fn load_document(&self) -> Result<SshConfigDocument, AppError> {
        let target = self.target()?;
        let content = self.read(&target)?.unwrap_or_default();
        Ok(SshConfigDocument::parse(&content))
    }

    /// Points the owned stanza for `host_alias` at `key_path`
    ///
    /// # Arguments
    /// * `host_alias` - Host the stanza is written for
    /// * `key_path` - Private key the host should use
    pub fn apply(&self, host_alias: &str, key_path: &Path) -> Result<(), AppError> {
        let target = self.target()?;
        let current = self.read(&target)?;

        let mut document = SshConfigDocument::parse(current.as_deref().unwrap_or_default());
        if document.unmanaged_host_count(host_alias) > 0 {
            tracing::warn!(
                "{} has its own 'Host {}' entry that may shadow the git-hyper block",
                target.display(),
                host_alias
            );
        }
        document.replace_owned(host_alias, key_path);
        let rendered = document.render();

        if current.as_deref() == Some(rendered.as_slice()) {
            tracing::debug!("{} already up to date", target.display());
            return Ok(());
        }

        write_atomic(&target, &rendered)?;
        tracing::info!(
            "{} now uses {} for {}",
            target.display(),
            key_path.display(),
            host_alias
        );
        Ok(())
    }

    /// `IdentityFile` of the owned stanza, if one exists
    pub fn identity_file(&self) -> Result<Option<PathBuf>, AppError> {
        Ok(self.load_document()?.owned_identity_file())
    }
}

/// Stages `content` next to `target` and renames it into place
fn write_atomic(target: &Path, content: &[u8]) -> Result<(), AppError> {
    let access = |e: std::io::Error| AppError::config_access(target, e);

    if let Some(parent) = target.parent() {
        create_private_dir(parent).map_err(|e| match e {
            AppError::Io(io) => access(io),
            other => other,
        })?;
    }

    let existing_permissions = fs::metadata(target).ok().map(|m| m.permissions());
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let temp_path = target.with_file_name(format!(".{file_name}.git-hyper.tmp"));

    let result = (|| -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut temp = options.open(&temp_path)?;
        temp.write_all(content)?;
        temp.sync_all()?;
        if let Some(permissions) = existing_permissions {
            fs::set_permissions(&temp_path, permissions)?;
        }
        fs::rename(&temp_path, target)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(access(e));
    }
    Ok(())
}

use std::{
    io::ErrorKind,
    path::PathBuf,
    process::{Command, Output},
};

use crate::error::AppError;

/// Global Git identity (user.name, user.email)
pub trait GitIdentity {
    /// Sets both identity values
    fn set_identity(&self, name: &str, email: &str) -> Result<(), AppError>;
    /// Reads both identity values; unset values come back as `None`
    fn get_identity(&self) -> Result<(Option<String>, Option<String>), AppError>;
}

/// Talks to the `git` executable
#[derive(Debug, Default)]
pub struct GitCli {
    /// Config file used instead of the global one
    config_file: Option<PathBuf>,
}

impl GitCli {
    /// Uses `git config --global`
    pub fn global() -> Self {
        Self { config_file: None }
    }

    /// Uses `git config --file <path>` instead of the global config
    #[cfg(test)]
    pub fn with_config_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
        }
    }

    /// Runs `git config <scope> <args>`
    fn git_config(&self, args: &[&str]) -> Result<Output, AppError> {
        let mut command = Command::new("git");
        command.arg("config");
        match &self.config_file {
            Some(path) => {
                command.arg("--file").arg(path);
            }
            None => {
                command.arg("--global");
            }
        }

        command.args(args).output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::GitUnavailable("git executable not found".to_string()),
            _ => AppError::GitUnavailable(format!("failed to run git: {e}")),
        })
    }

    /// Executes Git config get command
    ///
    /// # Arguments
    /// * `key` - Git config key (user.name or user.email)
    fn get_git_config(&self, key: &str) -> Result<Option<String>, AppError> {
        let git_command_output: Output = self.git_config(&["--get", key])?;

        // Exit status 1 means the key is not set
        if git_command_output.status.code() == Some(1) {
            return Ok(None);
        }
        if !git_command_output.status.success() {
            return Err(AppError::GitUnavailable(
                String::from_utf8(git_command_output.stderr)?.trim().to_string(),
            ));
        }

        let value = String::from_utf8(git_command_output.stdout)?;
        let value = value.trim_end_matches(['\n', '\r']);
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    /// Executes a Git config set command
    ///
    /// # Arguments
    /// * `key` - Git config key to set (user.name or user.email)
    /// * `value` - Value to set for key (username or email)
    fn set_git_config(&self, key: &str, value: &str) -> Result<(), AppError> {
        let git_command_output: Output = self.git_config(&[key, value])?;

        if !git_command_output.status.success() {
            return Err(AppError::GitUnavailable(
                String::from_utf8(git_command_output.stderr)?.trim().to_string(),
            ));
        }

        tracing::debug!("git config {} set", key);
        Ok(())
    }
}

impl GitIdentity for GitCli {
    fn set_identity(&self, name: &str, email: &str) -> Result<(), AppError> {
        self.set_git_config("user.name", name)?;
        self.set_git_config("user.email", email)?;
        tracing::info!("git identity set to {} <{}>", name, email);
        Ok(())
    }

    fn get_identity(&self) -> Result<(Option<String>, Option<String>), AppError> {
        Ok((
            self.get_git_config("user.name")?,
            self.get_git_config("user.email")?,
        ))
    }
}

/// Checks whether an executable can be started at all
pub fn tool_available(program: &str, version_arg: &str) -> bool {
    Command::new(program)
        .arg(version_arg)
        .output()
        .is_ok()
}

/// In-memory identity used by orchestrator tests
#[cfg(test)]
pub mod testing {
    use std::{
        cell::{Cell, RefCell},
        rc::Rc,
    };

    use super::*;

    #[derive(Default, Clone)]
    pub struct MemoryGit {
        pub identity: Rc<RefCell<(Option<String>, Option<String>)>>,
        pub fail: Rc<Cell<bool>>,
    }

    impl GitIdentity for MemoryGit {
        fn set_identity(&self, name: &str, email: &str) -> Result<(), AppError> {
            if self.fail.get() {
                return Err(AppError::GitUnavailable("git executable not found".to_string()));
            }
            *self.identity.borrow_mut() = (Some(name.to_string()), Some(email.to_string()));
            Ok(())
        }

        fn get_identity(&self) -> Result<(Option<String>, Option<String>), AppError> {
            Ok(self.identity.borrow().clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identity_round_trip() {
        if !tool_available("git", "--version") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let git = GitCli::with_config_file(dir.path().join("gitconfig"));

        assert_eq!(git.get_identity().unwrap(), (None, None));

        git.set_identity("Ada Lovelace", "ada@example.com").unwrap();
        assert_eq!(
            git.get_identity().unwrap(),
            (
                Some("Ada Lovelace".to_string()),
                Some("ada@example.com".to_string())
            )
        );

        git.set_identity("Grace Hopper", "grace@example.com").unwrap();
        assert_eq!(
            git.get_identity().unwrap(),
            (
                Some("Grace Hopper".to_string()),
                Some("grace@example.com".to_string())
            )
        );
    }
}

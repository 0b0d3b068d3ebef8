use std::path::PathBuf;

use crate::{
    account::AccountRecord,
    activation::{ActivationResult, Orchestrator},
    backup::BackupManager,
    config::Settings,
    error::AppError,
    git::{GitCli, GitIdentity},
    keys::{KeyGenerator, KeyProvisioner, SshKeygen, default_key_path},
    probe::{ProbeResult, ProbeTransport, Prober, SshTransport},
    ssh_config::SshConfigMerger,
    storage::AccountStore,
};

/// Options for a new account
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    /// Existing or desired private key path; derived from the name when `None`
    pub key_path: Option<PathBuf>,
    /// Generate the key now instead of on first activation
    pub generate_key: bool,
}

/// Entry point used by the command line and the interactive menu
pub struct AccountManager {
    settings: Settings,
    store: AccountStore,
    keys: KeyProvisioner,
    ssh: SshConfigMerger,
    git: Box<dyn GitIdentity>,
    prober: Prober,
}

impl AccountManager {
    /// Builds a manager that talks to the real `ssh-keygen`, `git` and `ssh`
    pub fn new(settings: Settings) -> Self {
        Self::with_collaborators(
            settings,
            Box::new(SshKeygen),
            Box::new(GitCli::global()),
            Box::new(SshTransport),
        )
    }

    /// Builds a manager with explicit external tools
    pub fn with_collaborators(
        settings: Settings,
        keygen: Box<dyn KeyGenerator>,
        git: Box<dyn GitIdentity>,
        transport: Box<dyn ProbeTransport>,
    ) -> Self {
        Self {
            store: AccountStore::open(settings.store_path()),
            keys: KeyProvisioner::new(keygen),
            ssh: SshConfigMerger::new(settings.ssh_config_path()),
            prober: Prober::new(transport, settings.probe_timeout),
            git,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn ssh_config(&self) -> &SshConfigMerger {
        &self.ssh
    }

    /// Lists accounts in creation order
    pub fn list_accounts(&self) -> Result<Vec<AccountRecord>, AppError> {
        self.store.list()
    }

    /// Adds an account, optionally generating its key right away
    ///
    /// # Arguments
    /// * `name` - Git user.name
    /// * `email` - Git user.email
    /// * `options` - Key location and generation choice
    pub fn add_account(
        &self,
        name: &str,
        email: &str,
        options: NewAccount,
    ) -> Result<AccountRecord, AppError> {
        let key_path = match options.key_path {
            Some(path) => path,
            None => {
                let taken: Vec<PathBuf> = self
                    .store
                    .list()?
                    .into_iter()
                    .map(|account| account.key_path)
                    .collect();
                default_key_path(&self.settings.ssh_dir, name, &taken)
            }
        };

        let record = self.store.add(name, email, &key_path)?;

        if options.generate_key {
            if let Err(e) = self.keys.ensure_key(&record) {
                // Leave no record behind that the user did not get a key for
                if let Err(remove_err) = self.store.remove(record.id) {
                    tracing::error!(
                        "could not remove account {} after key generation failed: {}",
                        record.id,
                        remove_err
                    );
                }
                return Err(e);
            }
        }

        Ok(record)
    }

    /// Activates an account and, on success, optionally probes connectivity
    pub fn activate_account(&self, id: u64, probe: bool) -> Result<ActivationResult, AppError> {
        let orchestrator = Orchestrator {
            store: &self.store,
            keys: &self.keys,
            ssh: &self.ssh,
            git: self.git.as_ref(),
            host_alias: &self.settings.host_alias,
        };

        let mut result = orchestrator.activate(id)?;
        if probe && result.is_active() {
            result.probe = Some(
                self.prober
                    .probe(&self.settings.host_alias, Some(&result.account.key_path)),
            );
        }
        Ok(result)
    }

    /// Removes an account; the ssh config is left alone until the next activation
    pub fn remove_account(&self, id: u64) -> Result<AccountRecord, AppError> {
        self.store.remove(id)
    }

    /// Edits name and/or email of an account
    pub fn update_account(
        &self,
        id: u64,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<AccountRecord, AppError> {
        self.store.update(id, name, email)
    }

    /// Gets the active account, if any
    pub fn current_account(&self) -> Result<Option<AccountRecord>, AppError> {
        self.store.get_active()
    }

    /// Probes the remote host with the active account's key
    pub fn test_connectivity(&self) -> Result<ProbeResult, AppError> {
        let active = self.store.get_active()?;
        Ok(self.prober.probe(
            &self.settings.host_alias,
            active.as_ref().map(|account| account.key_path.as_path()),
        ))
    }

    /// Reads the global git identity
    pub fn git_identity(&self) -> Result<(Option<String>, Option<String>), AppError> {
        self.git.get_identity()
    }

    /// Backup operations over the same locations
    pub fn backups(&self) -> BackupManager {
        BackupManager::new(&self.settings)
    }

    /// Reads an account's public key
    pub fn public_key(&self, account: &AccountRecord) -> Result<Option<String>, AppError> {
        self.keys.public_key(account)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        activation::{ActivationState, Outcome},
        git::testing::MemoryGit,
        keys::testing::FakeKeygen,
        probe::testing::CannedTransport,
        ssh_config::SshConfigDocument,
    };

    struct Harness {
        _dir: TempDir,
        manager: AccountManager,
        keygen: FakeKeygen,
        git: MemoryGit,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            data_dir: dir.path().join("data"),
            ssh_dir: dir.path().join("ssh"),
            host_alias: "github.com".to_string(),
            probe_timeout: Duration::from_secs(1),
        };
        let keygen = FakeKeygen::default();
        let git = MemoryGit::default();
        let manager = AccountManager::with_collaborators(
            settings,
            Box::new(keygen.clone()),
            Box::new(git.clone()),
            Box::new(CannedTransport::authenticated("octocat")),
        );
        Harness {
            _dir: dir,
            manager,
            keygen,
            git,
        }
    }

    fn owned_key(manager: &AccountManager) -> Option<PathBuf> {
        manager.ssh_config().identity_file().unwrap()
    }

    #[test]
    fn test_add_derives_key_path_and_defers_generation() {
        let h = harness();
        let alice = h
            .manager
            .add_account("Alice Smith", "alice@example.com", NewAccount::default())
            .unwrap();

        assert_eq!(alice.key_path, h.manager.settings().ssh_dir.join("git-hyper-alice-smith"));
        assert!(!alice.key_path.exists());
        assert_eq!(h.keygen.calls.get(), 0);
    }

    #[test]
    fn test_add_with_generation_creates_key() {
        let h = harness();
        let alice = h
            .manager
            .add_account(
                "Alice",
                "alice@example.com",
                NewAccount {
                    generate_key: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(alice.key_path.is_file());
        assert!(h.manager.public_key(&alice).unwrap().is_some());
    }

    #[test]
    fn test_add_rolls_back_when_generation_fails() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::resolve(
            Some(dir.path().join("data")),
            Some(dir.path().join("ssh")),
            None,
        )
        .unwrap();
        let manager = AccountManager::with_collaborators(
            settings,
            Box::new(FakeKeygen {
                fail: true,
                ..Default::default()
            }),
            Box::new(MemoryGit::default()),
            Box::new(CannedTransport::authenticated("octocat")),
        );

        let err = manager
            .add_account(
                "Alice",
                "alice@example.com",
                NewAccount {
                    generate_key: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::KeyGeneration(_)));
        assert!(manager.list_accounts().unwrap().is_empty());
    }

    /// Keygen that blocks the store's staging path, then fails
    struct BreakingKeygen {
        staging: PathBuf,
    }

    impl KeyGenerator for BreakingKeygen {
        fn generate(&self, _algorithm: &str, _comment: &str, _output: &Path) -> Result<(), AppError> {
            fs::create_dir(&self.staging)?;
            Err(AppError::KeyGeneration("ssh-keygen exited with 1".to_string()))
        }
    }

    #[test]
    fn test_generation_error_survives_failed_cleanup() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::resolve(
            Some(dir.path().join("data")),
            Some(dir.path().join("ssh")),
            None,
        )
        .unwrap();
        let staging = settings.store_path().with_extension("json.tmp");
        let manager = AccountManager::with_collaborators(
            settings,
            Box::new(BreakingKeygen { staging }),
            Box::new(MemoryGit::default()),
            Box::new(CannedTransport::authenticated("octocat")),
        );

        let err = manager
            .add_account(
                "Alice",
                "alice@example.com",
                NewAccount {
                    generate_key: true,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::KeyGeneration(_)));
    }

    #[test]
    fn test_activate_a_then_b() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        let b = h
            .manager
            .add_account("Bob", "bob@example.com", NewAccount::default())
            .unwrap();

        let first = h.manager.activate_account(a.id, false).unwrap();
        assert!(first.is_active());
        assert_eq!(first.previous, None);

        let second = h.manager.activate_account(b.id, false).unwrap();
        assert_eq!(second.final_state(), ActivationState::Active);
        assert_eq!(second.status(), "Active");
        assert_eq!(second.previous.map(|p| p.id), Some(a.id));

        assert_eq!(h.manager.current_account().unwrap().unwrap().id, b.id);
        assert_eq!(owned_key(&h.manager), Some(b.key_path.clone()));
        assert_eq!(
            h.git.get_identity().unwrap(),
            (Some("Bob".to_string()), Some("bob@example.com".to_string()))
        );
        assert_eq!(h.keygen.calls.get(), 2);
    }

    #[test]
    fn test_reactivation_reuses_key_and_config() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();

        h.manager.activate_account(a.id, false).unwrap();
        let config_path = h.manager.ssh_config().path().to_path_buf();
        let before = fs::read(&config_path).unwrap();

        let again = h.manager.activate_account(a.id, false).unwrap();
        assert!(again.is_active());
        assert_eq!(fs::read(&config_path).unwrap(), before);
        assert_eq!(h.keygen.calls.get(), 1);
    }

    #[test]
    fn test_git_failure_reports_partial_activation() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        let b = h
            .manager
            .add_account("Bob", "bob@example.com", NewAccount::default())
            .unwrap();
        h.manager.activate_account(a.id, false).unwrap();

        h.git.fail.set(true);
        let result = h.manager.activate_account(b.id, true).unwrap();

        assert_eq!(result.final_state(), ActivationState::SshConfigured);
        assert_eq!(result.status(), "Failed(SshConfigured, GitUnavailableError)");
        assert!(result.is_partial());
        assert!(matches!(
            result.outcome,
            Outcome::Failed {
                at: ActivationState::SshConfigured,
                cause: AppError::GitUnavailable(_)
            }
        ));
        // Probe only runs after a successful activation
        assert!(result.probe.is_none());

        assert_eq!(owned_key(&h.manager), Some(b.key_path.clone()));
        assert_eq!(h.manager.current_account().unwrap().unwrap().id, a.id);
        assert_eq!(
            h.git.get_identity().unwrap(),
            (Some("Alice".to_string()), Some("alice@example.com".to_string()))
        );
    }

    #[test]
    fn test_store_failure_after_git_reports_partial_activation() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        let b = h
            .manager
            .add_account("Bob", "bob@example.com", NewAccount::default())
            .unwrap();
        h.manager.activate_account(a.id, false).unwrap();

        // A directory where the store stages its writes makes every save fail
        fs::create_dir(h.manager.store().path().with_extension("json.tmp")).unwrap();
        let result = h.manager.activate_account(b.id, true).unwrap();

        assert_eq!(result.final_state(), ActivationState::GitConfigured);
        assert_eq!(result.status(), "Failed(GitConfigured, StoreError)");
        assert!(result.is_partial());
        assert!(matches!(result.cause(), Some(AppError::Store(_))));
        assert!(result.probe.is_none());

        assert_eq!(owned_key(&h.manager), Some(b.key_path.clone()));
        assert_eq!(
            h.git.get_identity().unwrap(),
            (Some("Bob".to_string()), Some("bob@example.com".to_string()))
        );
        assert_eq!(h.manager.current_account().unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_key_failure_touches_nothing() {
        let h = harness();
        let a = h
            .manager
            .add_account(
                "Alice",
                "alice@example.com",
                NewAccount {
                    key_path: Some(h.manager.settings().ssh_dir.join("notes")),
                    generate_key: false,
                },
            )
            .unwrap();
        fs::create_dir_all(&h.manager.settings().ssh_dir).unwrap();
        fs::write(&a.key_path, "not a key").unwrap();

        let result = h.manager.activate_account(a.id, true).unwrap();

        assert_eq!(result.final_state(), ActivationState::Idle);
        assert!(!result.is_partial());
        assert!(matches!(result.cause(), Some(AppError::PathConflict { .. })));
        assert!(!h.manager.ssh_config().path().exists());
        assert_eq!(h.git.get_identity().unwrap(), (None, None));
        assert!(h.manager.current_account().unwrap().is_none());
    }

    #[test]
    fn test_ssh_failure_stops_at_key_ready() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        // A directory in place of the config file cannot be read
        fs::create_dir_all(h.manager.ssh_config().path()).unwrap();

        let result = h.manager.activate_account(a.id, false).unwrap();

        assert_eq!(result.final_state(), ActivationState::KeyReady);
        assert!(matches!(result.cause(), Some(AppError::ConfigAccess { .. })));
        assert_eq!(h.git.get_identity().unwrap(), (None, None));
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let h = harness();
        assert!(matches!(
            h.manager.activate_account(7, false),
            Err(AppError::NotFound(7))
        ));
    }

    #[test]
    fn test_probe_attached_after_success() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();

        let result = h.manager.activate_account(a.id, true).unwrap();
        assert_eq!(
            result.probe,
            Some(ProbeResult::Reachable {
                username: Some("octocat".to_string())
            })
        );
    }

    #[test]
    fn test_removing_active_account_keeps_ssh_config() {
        let h = harness();
        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        h.manager.activate_account(a.id, false).unwrap();
        let before = fs::read(h.manager.ssh_config().path()).unwrap();

        h.manager.remove_account(a.id).unwrap();

        assert!(h.manager.current_account().unwrap().is_none());
        assert_eq!(fs::read(h.manager.ssh_config().path()).unwrap(), before);
    }

    #[test]
    fn test_unrelated_ssh_entries_survive_switching() {
        let h = harness();
        let unrelated = "Host work\n    HostName git.work.example\n    IdentityFile ~/.ssh/work\n";
        let config_path = h.manager.ssh_config().path().to_path_buf();
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(&config_path, unrelated).unwrap();

        let a = h
            .manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        let b = h
            .manager
            .add_account("Bob", "bob@example.com", NewAccount::default())
            .unwrap();
        for id in [a.id, b.id, a.id] {
            h.manager.activate_account(id, false).unwrap();
        }

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.starts_with(unrelated));
        let document = SshConfigDocument::parse(content.as_bytes());
        assert_eq!(document.owned_count(), 1);
        assert_eq!(document.owned_identity_file().as_deref(), Some(Path::new(&a.key_path)));
    }

    #[test]
    fn test_connectivity_uses_active_key() {
        let dir = TempDir::new().unwrap();
        let transport = CannedTransport::authenticated("alice");
        let seen = transport.seen_keys.clone();
        let manager = AccountManager::with_collaborators(
            Settings::resolve(Some(dir.path().join("d")), Some(dir.path().join("s")), None)
                .unwrap(),
            Box::new(FakeKeygen::default()),
            Box::new(MemoryGit::default()),
            Box::new(transport),
        );

        manager.test_connectivity().unwrap();
        let a = manager
            .add_account("Alice", "alice@example.com", NewAccount::default())
            .unwrap();
        manager.activate_account(a.id, false).unwrap();
        manager.test_connectivity().unwrap();

        assert_eq!(seen.borrow().as_slice(), &[None, Some(a.key_path.clone())]);
    }
}

//! Activation state machine
//!
//! Activating an account touches three independent resources: the ssh
//! config, the global git config and the account store. None of them can
//! take part in a shared transaction, so activation walks a fixed sequence
//! of states and stops at the first failure, reporting where it stopped.
//! Nothing is rolled back.
//!
//! ```text
//! Idle -> KeyReady -> SshConfigured -> GitConfigured -> Active
//!   \________\______________\________________\-------> Failed(at, cause)
//! ```

use std::fmt;

use crate::{
    account::AccountRecord,
    error::AppError,
    git::GitIdentity,
    keys::KeyProvisioner,
    probe::ProbeResult,
    ssh_config::SshConfigMerger,
    storage::AccountStore,
};

/// Progress of one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Idle,
    KeyReady,
    SshConfigured,
    GitConfigured,
    Active,
}

impl ActivationState {
    /// Name of the step that leaves this state
    pub fn next_step(self) -> &'static str {
        match self {
            ActivationState::Idle => "key provisioning",
            ActivationState::KeyReady => "ssh config update",
            ActivationState::SshConfigured => "git identity update",
            ActivationState::GitConfigured => "account store update",
            ActivationState::Active => "none",
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where an activation ended
#[derive(Debug)]
pub enum Outcome {
    Active,
    Failed {
        /// Last state reached before the failing step
        at: ActivationState,
        cause: AppError,
    },
}

/// Everything the caller needs to report an activation
#[derive(Debug)]
pub struct ActivationResult {
    /// Account that was being activated
    pub account: AccountRecord,
    /// Account that was active before, if a different one
    pub previous: Option<AccountRecord>,
    pub outcome: Outcome,
    /// Advisory connectivity check, only run after success
    pub probe: Option<ProbeResult>,
}

impl ActivationResult {
    /// Final state of the machine
    pub fn final_state(&self) -> ActivationState {
        match &self.outcome {
            Outcome::Active => ActivationState::Active,
            Outcome::Failed { at, .. } => *at,
        }
    }

    /// Final state by name, e.g. `Failed(SshConfigured, GitUnavailableError)`
    pub fn status(&self) -> String {
        match &self.outcome {
            Outcome::Active => ActivationState::Active.to_string(),
            Outcome::Failed { at, cause } => format!("Failed({at}, {})", cause.kind()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.outcome, Outcome::Active)
    }

    /// True when some resources already point at the new account and others do not
    pub fn is_partial(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Failed {
                at: ActivationState::SshConfigured | ActivationState::GitConfigured,
                ..
            }
        )
    }

    /// Failure cause, if any
    pub fn cause(&self) -> Option<&AppError> {
        match &self.outcome {
            Outcome::Active => None,
            Outcome::Failed { cause, .. } => Some(cause),
        }
    }
}

/// Drives one account through the activation states
pub struct Orchestrator<'a> {
    pub store: &'a AccountStore,
    pub keys: &'a KeyProvisioner,
    pub ssh: &'a SshConfigMerger,
    pub git: &'a dyn GitIdentity,
    pub host_alias: &'a str,
}

impl Orchestrator<'_> {
    /// Activates account `id`
    ///
    /// Errors are returned only when the account cannot be loaded; every
    /// failure after that is reported through [`Outcome::Failed`].
    pub fn activate(&self, id: u64) -> Result<ActivationResult, AppError> {
        let account = self.store.get(id)?;
        let previous = self.store.get_active()?.filter(|active| active.id != id);

        let mut state = ActivationState::Idle;
        let outcome = loop {
            match self.step(state, &account) {
                Ok(ActivationState::Active) => {
                    tracing::info!("account {} active", account.id);
                    break Outcome::Active;
                }
                Ok(next) => {
                    tracing::debug!("activation of {}: {} -> {}", account.id, state, next);
                    state = next;
                }
                Err(cause) => {
                    tracing::warn!(
                        "activation of {} failed during {}: {}",
                        account.id,
                        state.next_step(),
                        cause
                    );
                    break Outcome::Failed { at: state, cause };
                }
            }
        };

        Ok(ActivationResult {
            account,
            previous,
            outcome,
            probe: None,
        })
    }

    /// Runs the step leaving `state` and returns the state it reaches
    fn step(
        &self,
        state: ActivationState,
        account: &AccountRecord,
    ) -> Result<ActivationState, AppError> {
        match state {
            ActivationState::Idle => {
                let pair = self.keys.ensure_key(account)?;
                tracing::debug!("key ready, public half at {}", pair.public_key.display());
                Ok(ActivationState::KeyReady)
            }
            ActivationState::KeyReady => {
                self.ssh.apply(self.host_alias, &account.key_path)?;
                Ok(ActivationState::SshConfigured)
            }
            ActivationState::SshConfigured => {
                self.git
                    .set_identity(&account.display_name, &account.email)?;
                Ok(ActivationState::GitConfigured)
            }
            ActivationState::GitConfigured => {
                self.store.set_active(account.id)?;
                Ok(ActivationState::Active)
            }
            ActivationState::Active => Ok(ActivationState::Active),
        }
    }
}

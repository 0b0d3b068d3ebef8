use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::backup::DEFAULT_KEEP;

/// CLI arguments parser using `clap`
#[derive(Parser, Debug)]
#[command(name = "git-hyper", version, about)]
pub struct Cli {
    /// Directory holding the account store
    #[arg(long, env = "GIT_HYPER_HOME", global = true)]
    pub data_dir: Option<PathBuf>,
    /// Directory holding the ssh config and generated keys
    #[arg(long, env = "GIT_HYPER_SSH_DIR", global = true)]
    pub ssh_dir: Option<PathBuf>,
    /// Seconds before a connectivity probe gives up
    #[arg(long, env = "GIT_HYPER_PROBE_TIMEOUT", global = true)]
    pub probe_timeout: Option<u64>,
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Subcommand chosen to execute; none opens the menu
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lists all accounts
    List,
    /// Adds a new account
    Add {
        /// Git user.name
        name: String,
        /// Git user.email
        email: String,
        /// Private key to use instead of a generated one
        #[arg(long)]
        key: Option<PathBuf>,
        /// Generate the key on first activation instead of now
        #[arg(long)]
        no_generate: bool,
        /// Activate the account right after adding it
        #[arg(long)]
        activate: bool,
    },
    /// Makes an account the active Git and SSH identity
    Activate {
        /// Account id
        id: u64,
        /// Skip the connectivity check afterwards
        #[arg(long)]
        no_probe: bool,
    },
    /// Removes an account
    Remove {
        /// Account id
        id: u64,
    },
    /// Changes the name or email of an account
    Update {
        /// Account id
        id: u64,
        /// New Git user.name
        #[arg(long)]
        name: Option<String>,
        /// New Git user.email
        #[arg(long)]
        email: Option<String>,
    },
    /// Displays the active account
    Current,
    /// Tests the SSH connection to GitHub
    Test,
    /// Checks tools, files and identities for problems
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Skip the network check
        #[arg(long)]
        offline: bool,
    },
    /// Archives accounts, keys and the ssh config
    Backup {
        /// Archive name; timestamped when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Lists backup archives
    Backups,
    /// Restores a backup archive over the current state
    Restore {
        /// Archive to restore
        file: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Deletes old automatic backups
    Cleanup {
        /// Number of automatic backups to keep
        #[arg(short, long, default_value_t = DEFAULT_KEEP)]
        keep: usize,
    },
}

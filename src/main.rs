use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use colored::Colorize;
use inquire::Confirm;
use tracing_subscriber::EnvFilter;

mod account;
mod activation;
mod backup;
mod cli;
mod config;
mod doctor;
mod error;
mod git;
mod keys;
mod manager;
mod menu;
mod probe;
mod ssh_config;
mod storage;
mod validation;

use crate::{
    account::AccountRecord,
    activation::{ActivationResult, ActivationState},
    cli::{Cli, Commands},
    config::Settings,
    error::AppError,
    manager::{AccountManager, NewAccount},
    probe::ProbeResult,
};

// Main
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {}", "error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `-v`
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("git_hyper={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runs the chosen command; `Ok(false)` means it finished but did not fully succeed
fn run(cli: Cli) -> Result<bool, AppError> {
    let settings = Settings::resolve(cli.data_dir, cli.ssh_dir, cli.probe_timeout)?;
    let manager = AccountManager::new(settings);

    match cli.command {
        Some(Commands::List) => list_all_accounts(&manager).map(|_| true),
        Some(Commands::Add {
            name,
            email,
            key,
            no_generate,
            activate,
        }) => {
            let key_path = key.map(std::path::absolute).transpose()?;
            let account = add_account(&manager, &name, &email, key_path, !no_generate)?;
            if activate {
                activate_account(&manager, account.id, true)
            } else {
                Ok(true)
            }
        }
        Some(Commands::Activate { id, no_probe }) => activate_account(&manager, id, !no_probe),
        Some(Commands::Remove { id }) => remove_account(&manager, id).map(|_| true),
        Some(Commands::Update { id, name, email }) => {
            update_account(&manager, id, name.as_deref(), email.as_deref()).map(|_| true)
        }
        Some(Commands::Current) => show_current_account(&manager).map(|_| true),
        Some(Commands::Test) => test_connection(&manager),
        Some(Commands::Doctor { json, offline }) => run_doctor(&manager, json, !offline),
        Some(Commands::Backup { name }) => create_backup(&manager, name.as_deref()).map(|_| true),
        Some(Commands::Backups) => list_backups(&manager).map(|_| true),
        Some(Commands::Restore { file, yes }) => restore_backup(&manager, &file, yes),
        Some(Commands::Cleanup { keep }) => cleanup_backups(&manager, keep).map(|_| true),
        None => menu::run_menu(&manager).map(|_| true),
    }
}

/// Adds an account and shows its public key when one was generated
pub fn add_account(
    manager: &AccountManager,
    name: &str,
    email: &str,
    key_path: Option<PathBuf>,
    generate_key: bool,
) -> Result<AccountRecord, AppError> {
    let account = manager.add_account(
        name,
        email,
        NewAccount {
            key_path,
            generate_key,
        },
    )?;
    println!(
        "{} {} {} <{}>",
        "added account".green(),
        account.id,
        account.display_name,
        account.email
    );

    if let Some(public_key) = manager.public_key(&account)? {
        println!("\n{}", "public key (add it to GitHub → Settings → SSH keys):".yellow());
        println!("{}\n", public_key.cyan());
    } else {
        println!(
            "{} {}",
            "key will be generated on first activation:".blue(),
            account.key_path.display()
        );
    }
    Ok(account)
}

/// Activates an account and prints what happened at each step
pub fn activate_account(manager: &AccountManager, id: u64, probe: bool) -> Result<bool, AppError> {
    let result = manager.activate_account(id, probe)?;
    print_activation(&result);
    Ok(result.is_active())
}

fn print_activation(result: &ActivationResult) {
    let account = &result.account;
    let Some(cause) = result.cause() else {
        println!(
            "{} {} <{}>",
            "switched to account:".green(),
            account.display_name,
            account.email
        );
        if let Some(previous) = &result.previous {
            println!("{} {}", "previous account:".blue(), previous.display_name);
        }
        if let Some(probe) = &result.probe {
            print_probe(probe);
        }
        return;
    };

    let state = result.final_state();
    println!(
        "{} {} failed: {}",
        "activation stopped:".red(),
        state.next_step(),
        cause
    );
    println!("{} {}", "state:".blue(), result.status());
    if !result.is_partial() {
        println!("{}", "nothing was changed".yellow());
    } else if state == ActivationState::SshConfigured {
        println!(
            "{}",
            "partial activation: ssh now uses the new key, but the git identity and \
             active account are unchanged. Fix the cause and run activate again."
                .yellow()
        );
    } else {
        println!(
            "{}",
            "partial activation: ssh and git identity point at the new account, but \
             the account store still lists the previous one as active. Fix the cause \
             and run activate again."
                .yellow()
        );
    }
}

fn print_probe(probe: &ProbeResult) {
    match probe {
        ProbeResult::Reachable { .. } => println!("{} {}", "connection:".green(), probe),
        _ => println!("{} {}", "connection:".red(), probe),
    }
}

/// Removes an account
pub fn remove_account(manager: &AccountManager, id: u64) -> Result<(), AppError> {
    let removed = manager.remove_account(id)?;
    println!("{} {}", "removed account:".green(), removed.display_name);
    if removed.is_active {
        println!(
            "{}",
            "it was the active account; no account is active now".yellow()
        );
    }
    Ok(())
}

/// Updates an account's name and/or email
pub fn update_account(
    manager: &AccountManager,
    id: u64,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<(), AppError> {
    if name.is_none() && email.is_none() {
        return Err(AppError::Validation(
            "nothing to update, pass --name or --email".to_string(),
        ));
    }
    let updated = manager.update_account(id, name, email)?;
    println!(
        "{} {} <{}>",
        "updated account:".green(),
        updated.display_name,
        updated.email
    );
    if updated.is_active {
        println!(
            "{}",
            "run activate again to apply the change to git".yellow()
        );
    }
    Ok(())
}

/// Shows the active account, git identity and ssh key in use
pub fn show_current_account(manager: &AccountManager) -> Result<(), AppError> {
    match manager.current_account()? {
        Some(account) => {
            println!("{} {}", "id:".blue(), account.id);
            println!("{} {}", "name:".blue(), account.display_name);
            println!("{} {}", "email:".blue(), account.email);
            println!("{} {}", "key:".blue(), account.key_path.display());
            if let Some(public_key) = manager.public_key(&account)? {
                println!("{}\n{}", "public key:".blue(), public_key.cyan());
            }
        }
        None => println!("{}", "no active account".yellow()),
    }

    let (name, email) = manager.git_identity()?;
    println!(
        "{} {} <{}>",
        "git identity:".blue(),
        name.as_deref().unwrap_or("(unset)"),
        email.as_deref().unwrap_or("(unset)")
    );
    match manager.ssh_config().identity_file()? {
        Some(key) => println!("{} {}", "ssh key in use:".blue(), key.display()),
        None => println!("{}", "ssh config has no git-hyper block".yellow()),
    }
    Ok(())
}

/// Lists all accounts as a table
pub fn list_all_accounts(manager: &AccountManager) -> Result<(), AppError> {
    let accounts = manager.list_accounts()?;
    if accounts.is_empty() {
        println!("{}", "no accounts yet, add one first".yellow());
        return Ok(());
    }

    println!(
        "{:>4}  {:<24}  {:<32}  {}",
        "ID".bold(),
        "NAME".bold(),
        "EMAIL".bold(),
        "ACTIVE".bold()
    );
    for account in accounts {
        let active = if account.is_active {
            "yes".green()
        } else {
            "no".normal()
        };
        println!(
            "{:>4}  {:<24}  {:<32}  {}",
            account.id,
            truncate(&account.display_name, 24),
            truncate(&account.email, 32),
            active
        );
    }
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Probes GitHub with the active account's key
pub fn test_connection(manager: &AccountManager) -> Result<bool, AppError> {
    let probe = manager.test_connectivity()?;
    print_probe(&probe);
    Ok(matches!(probe, ProbeResult::Reachable { .. }))
}

/// Runs the health checks
fn run_doctor(manager: &AccountManager, json: bool, probe: bool) -> Result<bool, AppError> {
    let report = doctor::run_diagnosis(manager, probe);
    if json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        report.print();
    }
    Ok(report.is_healthy())
}

/// Writes a backup archive
pub fn create_backup(manager: &AccountManager, name: Option<&str>) -> Result<(), AppError> {
    let path = manager.backups().create_backup(name)?;
    println!("{} {}", "backup written:".green(), path.display());
    Ok(())
}

/// Lists backup archives, newest first
fn list_backups(manager: &AccountManager) -> Result<(), AppError> {
    let backups = manager.backups();
    let listed = backups.list_backups()?;
    if listed.is_empty() {
        println!(
            "{} {}",
            "no backups in".yellow(),
            backups.backup_dir().display()
        );
        return Ok(());
    }

    for backup in listed {
        let name = backup
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let accounts = backup
            .accounts
            .map(|count| format!("{count} accounts"))
            .unwrap_or_else(|| "no manifest".to_string());
        println!("{}", name.bold());
        println!(
            "    {:.1} KB, {}, {}",
            backup.size as f64 / 1024.0,
            backup
                .modified
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            accounts
        );
    }
    Ok(())
}

/// Restores a backup after confirmation
fn restore_backup(manager: &AccountManager, file: &Path, yes: bool) -> Result<bool, AppError> {
    if !yes {
        let confirmed = Confirm::new("this overwrites the current accounts, keys and ssh config. continue?")
            .with_default(false)
            .prompt()?;
        if !confirmed {
            println!("{}", "restore cancelled".yellow());
            return Ok(false);
        }
    }

    let report = manager.backups().restore_backup(file)?;
    if let Some(safety) = &report.safety_backup {
        println!("{} {}", "previous state saved to:".blue(), safety.display());
    }
    println!(
        "{} {} data files, {} keys{}",
        "restored:".green(),
        report.data_files,
        report.keys,
        if report.ssh_config { ", ssh config" } else { "" }
    );
    if let Some(manifest) = &report.manifest {
        println!(
            "{} {}",
            "backup taken:".blue(),
            manifest.backup_date.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
        for account in &manifest.accounts {
            let marker = if account.is_active { " (active)".green() } else { "".normal() };
            println!("    {} <{}>{}", account.display_name, account.email, marker);
        }
    }
    println!(
        "{}",
        "run activate to reapply an account to git and ssh".yellow()
    );
    Ok(true)
}

/// Prunes old automatic backups
fn cleanup_backups(manager: &AccountManager, keep: usize) -> Result<(), AppError> {
    let removed = manager.backups().cleanup_backups(keep)?;
    for path in &removed {
        println!("{} {}", "removed:".blue(), path.display());
    }
    println!(
        "{} {} old backups removed, newest {} kept",
        "cleanup done:".green(),
        removed.len(),
        keep
    );
    Ok(())
}

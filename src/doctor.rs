//! Read-only health checks for the tools, files and identities git-hyper manages

use std::path::Path;

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::{
    account::AccountRecord,
    git::tool_available,
    manager::AccountManager,
    probe::ProbeResult,
};

/// Findings of one diagnosis run
#[derive(Debug, Default, Serialize)]
pub struct DoctorReport {
    /// Things that break switching or authentication
    pub issues: Vec<String>,
    /// Things worth a look that do not break anything yet
    pub warnings: Vec<String>,
    /// Passed checks, shown in human output only
    #[serde(skip)]
    pub passed: Vec<String>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    /// JSON form: status, issues, warnings and a timestamp
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy() { "healthy" } else { "issues" },
            "issues": self.issues,
            "warnings": self.warnings,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    /// Prints the report for a terminal
    pub fn print(&self) {
        for line in &self.passed {
            println!("{} {}", "ok".green(), line);
        }
        println!();

        if self.issues.is_empty() && self.warnings.is_empty() {
            println!("{}", "no problems found".green());
            return;
        }
        if !self.issues.is_empty() {
            println!("{}", "issues:".red());
            for (i, issue) in self.issues.iter().enumerate() {
                println!("  {}. {}", i + 1, issue);
            }
        }
        if !self.warnings.is_empty() {
            println!("{}", "warnings:".yellow());
            for (i, warning) in self.warnings.iter().enumerate() {
                println!("  {}. {}", i + 1, warning);
            }
        }
    }
}

/// Runs every check; `probe` adds the network round trip
pub fn run_diagnosis(manager: &AccountManager, probe: bool) -> DoctorReport {
    let mut report = DoctorReport::default();

    check_tools(&mut report);
    let accounts = check_store(manager, &mut report);
    let active = accounts.iter().find(|account| account.is_active);
    check_ssh_dir(manager, &mut report);
    check_ssh_config(manager, active, &mut report);
    check_keys(&accounts, &mut report);
    check_git_identity(manager, active, &mut report);
    if probe {
        check_connectivity(manager, &mut report);
    }

    report
}

fn check_tools(report: &mut DoctorReport) {
    for (program, arg) in [("git", "--version"), ("ssh", "-V"), ("ssh-keygen", "-?")] {
        if tool_available(program, arg) {
            report.passed.push(format!("{program} found"));
        } else {
            report
                .issues
                .push(format!("{program} is not installed or not on PATH"));
        }
    }
}

fn check_store(manager: &AccountManager, report: &mut DoctorReport) -> Vec<AccountRecord> {
    match manager.list_accounts() {
        Ok(accounts) => {
            report.passed.push(format!(
                "{} accounts in {}",
                accounts.len(),
                manager.store().path().display()
            ));
            if !accounts.iter().any(|account| account.is_active) {
                report.warnings.push("no active account".to_string());
            }
            accounts
        }
        Err(e) => {
            report.issues.push(e.to_string());
            Vec::new()
        }
    }
}

fn check_ssh_dir(manager: &AccountManager, report: &mut DoctorReport) {
    let ssh_dir = &manager.settings().ssh_dir;
    if !ssh_dir.exists() {
        report
            .warnings
            .push(format!("{} does not exist yet", ssh_dir.display()));
        return;
    }
    if let Some(mode) = file_mode(ssh_dir) {
        if mode != 0o700 {
            report.issues.push(format!(
                "{} has mode {:o}, expected 700",
                ssh_dir.display(),
                mode
            ));
        }
    }
}

fn check_ssh_config(
    manager: &AccountManager,
    active: Option<&AccountRecord>,
    report: &mut DoctorReport,
) {
    let ssh = manager.ssh_config();
    if !ssh.path().exists() {
        report
            .warnings
            .push(format!("{} not found", ssh.path().display()));
        return;
    }

    if let Some(mode) = file_mode(ssh.path()) {
        if mode != 0o600 && mode != 0o644 {
            report.issues.push(format!(
                "{} has mode {:o}, expected 600",
                ssh.path().display(),
                mode
            ));
        }
    }

    let document = match ssh.load_document() {
        Ok(document) => document,
        Err(e) => {
            report.issues.push(e.to_string());
            return;
        }
    };

    match document.owned_count() {
        0 => report
            .warnings
            .push("ssh config has no git-hyper block".to_string()),
        1 => report.passed.push("git-hyper block found in ssh config".to_string()),
        n => report
            .issues
            .push(format!("ssh config has {n} git-hyper blocks, expected one")),
    }

    let host = &manager.settings().host_alias;
    if document.unmanaged_host_count(host) > 0 {
        report.warnings.push(format!(
            "ssh config has its own 'Host {host}' entry that may shadow the git-hyper block"
        ));
    }

    if let (Some(account), Some(key)) = (active, document.owned_identity_file()) {
        if account.key_path != key {
            report.issues.push(format!(
                "ssh config uses {} but the active account's key is {}",
                key.display(),
                account.key_path.display()
            ));
        }
    }
}

fn check_keys(accounts: &[AccountRecord], report: &mut DoctorReport) {
    for account in accounts {
        if !account.key_path.exists() {
            report.warnings.push(format!(
                "key for account {} not generated yet ({})",
                account.id,
                account.key_path.display()
            ));
            continue;
        }
        if let Some(mode) = file_mode(&account.key_path) {
            if mode != 0o600 {
                report.issues.push(format!(
                    "private key {} has mode {:o}, expected 600",
                    account.key_path.display(),
                    mode
                ));
            }
        }
    }
}

fn check_git_identity(
    manager: &AccountManager,
    active: Option<&AccountRecord>,
    report: &mut DoctorReport,
) {
    let (name, email) = match manager.git_identity() {
        Ok(identity) => identity,
        Err(e) => {
            report.issues.push(e.to_string());
            return;
        }
    };

    match (&name, &email) {
        (Some(name), Some(email)) => report
            .passed
            .push(format!("git identity {name} <{email}>")),
        _ => report
            .warnings
            .push("global git user.name or user.email not set".to_string()),
    }

    if let Some(account) = active {
        if name.as_deref() != Some(account.display_name.as_str())
            || email.as_deref() != Some(account.email.as_str())
        {
            report.issues.push(format!(
                "git identity does not match the active account {} <{}>",
                account.display_name, account.email
            ));
        }
    }
}

fn check_connectivity(manager: &AccountManager, report: &mut DoctorReport) {
    match manager.test_connectivity() {
        Ok(ProbeResult::Reachable { username }) => report.passed.push(match username {
            Some(user) => format!("authenticated to {} as {user}", manager.settings().host_alias),
            None => format!("connected to {}", manager.settings().host_alias),
        }),
        Ok(other) => report.issues.push(format!(
            "{} probe: {other}",
            manager.settings().host_alias
        )),
        Err(e) => report.issues.push(e.to_string()),
    }
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|metadata| metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

use colored::Colorize;
use inquire::{Confirm, Select, Text};

use crate::{
    account::AccountRecord,
    activate_account, add_account, create_backup,
    error::AppError,
    list_all_accounts,
    manager::AccountManager,
    remove_account, show_current_account, test_connection, update_account,
    validation::{prompt_until_valid, validate_display_name, validate_email},
};

/// Entry that leaves a sub-menu
const BACK_OPTION: &str = "back";

/// Runs interactive menu interface
pub fn run_menu(manager: &AccountManager) -> Result<(), AppError> {
    loop {
        match manager.current_account()? {
            Some(account) => println!(
                "{} {} <{}>",
                "active account:".magenta(),
                account.display_name,
                account.email
            ),
            None => println!("{}", "no active account, add one to get started".yellow()),
        }

        let actions: Vec<&'static str> = vec![
            "activate account",
            "add account",
            "list accounts",
            "show current account",
            "update account",
            "remove account",
            "test connection",
            "create backup",
            "quit",
        ];

        let action_selected: &'static str =
            Select::new(&format!("{}", "select action".blue()), actions).prompt()?;

        let result = match action_selected {
            "activate account" => menu_activate_account(manager),
            "add account" => menu_add_account(manager),
            "list accounts" => list_all_accounts(manager),
            "show current account" => show_current_account(manager),
            "update account" => menu_update_account(manager),
            "remove account" => menu_remove_account(manager),
            "test connection" => test_connection(manager).map(|_| ()),
            "create backup" => create_backup(manager, None),
            "quit" => {
                println!("{}", "quitting".yellow());
                break Ok(());
            }
            _ => unreachable!("unexpected input"),
        };

        // Input errors end the menu, everything else is reported and the loop goes on
        match result {
            Err(AppError::Inquire(e)) => return Err(AppError::Inquire(e)),
            Err(e) => println!("{} {}", "error:".red(), e),
            Ok(()) => {}
        }
        println!();
    }
}

/// Menu for activating an account
fn menu_activate_account(manager: &AccountManager) -> Result<(), AppError> {
    if let Some(account) = select_account(manager, "select account to activate:")? {
        activate_account(manager, account.id, true)?;
    }
    Ok(())
}

/// Menu for adding a new account
fn menu_add_account(manager: &AccountManager) -> Result<(), AppError> {
    let accounts: Vec<AccountRecord> = manager.list_accounts()?;

    let name: String = prompt_until_valid(
        &format!("{}", "enter git name:".blue()),
        validate_display_name,
    )?;

    let email: String = prompt_until_valid(&format!("{}", "enter git email:".blue()), |input| {
        validate_email(input, &accounts, None)
    })?;

    let key_choice = Select::new(
        &format!("{}", "ssh key:".blue()),
        vec!["generate a new key", "use an existing key"],
    )
    .prompt()?;

    let key_path = if key_choice == "use an existing key" {
        let path = Text::new(&format!("{}", "path to private key:".blue())).prompt()?;
        Some(std::path::absolute(path.trim())?)
    } else {
        None
    };

    let account = add_account(manager, &name, &email, key_path, true)?;

    if Confirm::new("activate it now?").with_default(true).prompt()? {
        activate_account(manager, account.id, true)?;
    }
    Ok(())
}

/// Menu for editing an account
fn menu_update_account(manager: &AccountManager) -> Result<(), AppError> {
    let Some(account) = select_account(manager, "select account to update:")? else {
        return Ok(());
    };
    let accounts = manager.list_accounts()?;

    let name = Text::new(&format!("{}", "git name:".blue()))
        .with_initial_value(&account.display_name)
        .prompt()?;
    let email = Text::new(&format!("{}", "git email:".blue()))
        .with_initial_value(&account.email)
        .prompt()?;

    validate_display_name(name.trim())?;
    validate_email(email.trim(), &accounts, Some(account.id))?;

    let name = (name.trim() != account.display_name).then(|| name.trim().to_string());
    let email = (email.trim() != account.email).then(|| email.trim().to_string());
    if name.is_none() && email.is_none() {
        println!("{}", "nothing changed".yellow());
        return Ok(());
    }
    update_account(manager, account.id, name.as_deref(), email.as_deref())
}

/// Menu for removing an account
fn menu_remove_account(manager: &AccountManager) -> Result<(), AppError> {
    let Some(account) = select_account(manager, "select account to remove:")? else {
        return Ok(());
    };

    let confirmed = Confirm::new(&format!("remove account '{}'?", account.display_name))
        .with_default(false)
        .prompt()?;
    if confirmed {
        remove_account(manager, account.id)?;
    }
    Ok(())
}

/// Lets the user pick an account; `None` when they go back
fn select_account(
    manager: &AccountManager,
    prompt: &str,
) -> Result<Option<AccountRecord>, AppError> {
    let accounts = manager.list_accounts()?;
    if accounts.is_empty() {
        return Err(AppError::Validation("no accounts found".to_string()));
    }

    let choices = build_account_choices(&accounts);
    let selected = Select::new(&format!("{}", prompt.blue()), choices.clone()).prompt()?;

    let index = choices
        .iter()
        .position(|choice| *choice == selected)
        .filter(|index| *index < accounts.len());
    Ok(index.map(|index| accounts[index].clone()))
}

/// Builds the account list for the menu to display
pub fn build_account_choices(accounts: &[AccountRecord]) -> Vec<String> {
    let mut choices: Vec<String> = accounts
        .iter()
        .map(|account| {
            let marker = if account.is_active { " (active)" } else { "" };
            format!(
                "{}: {} <{}>{}",
                account.id, account.display_name, account.email, marker
            )
        })
        .collect();
    choices.push(BACK_OPTION.to_string());
    choices
}

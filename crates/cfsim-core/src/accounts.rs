//! Account list files.
//!
//! One account per line as `accountId,sessionToken`. Blank lines and lines
//! starting with `#` are skipped; extra comma-separated fields are ignored;
//! lines with fewer than two fields are skipped with a warning.

use std::fs;
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::credentials::Credentials;
use crate::error::CoreError;

const ACCOUNTS_TEMPLATE: &str = "\
# cfsim account list
# Format: accountId,sessionToken
# One account per line; lines starting with # are comments.

# Example:
# 186812,488eb840-c068-4c75-9df3-a3XXXXX

";

/// Parse account lines.
pub fn parse_accounts(content: &str) -> Vec<Credentials> {
    let mut accounts = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split(',').map(str::trim);
        match (fields.next(), fields.next()) {
            (Some(account), Some(token)) if !account.is_empty() && !token.is_empty() => {
                accounts.push(Credentials::new(account, token));
            }
            _ => warn!(line = index + 1, "malformed account line skipped"),
        }
    }

    accounts
}

/// Read and parse an account list file.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file cannot be read.
#[instrument]
pub fn load_accounts(path: &Path) -> Result<Vec<Credentials>, CoreError> {
    let content = fs::read_to_string(path)?;
    let accounts = parse_accounts(&content);
    info!(count = accounts.len(), "accounts loaded");
    Ok(accounts)
}

/// Write a commented account list template.
///
/// # Errors
///
/// Returns `CoreError::Configuration` if `path` already exists.
/// Returns `CoreError::Io` if the file cannot be written.
pub fn write_accounts_template(path: &Path) -> Result<(), CoreError> {
    if path.exists() {
        return Err(CoreError::Configuration(format!(
            "refusing to overwrite existing file: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, ACCOUNTS_TEMPLATE)?;
    info!(path = %path.display(), "account template written");
    Ok(())
}

use std::ffi::OsStr;
use std::fs;

use clap_complete::engine::CompletionCandidate;

use crate::locate::SystemLocator;
use crate::steam::accounts::{AccountFragment, extract_accounts};

/// Roster entries straight from disk. Completion must stay quiet and fast, so
/// any failure yields no candidates.
fn roster() -> Vec<AccountFragment> {
    let Ok(root) = SystemLocator::new(None).locate_now() else {
        return Vec::new();
    };
    fs::read_to_string(root.join("config/loginusers.vdf"))
        .map_or_else(|_| Vec::new(), |text| extract_accounts(&text))
}

fn matching(current: &OsStr, items: impl Iterator<Item = (String, String)>) -> Vec<CompletionCandidate> {
    let prefix = current.to_string_lossy();
    items
        .filter(|(value, _)| value.starts_with(prefix.as_ref()))
        .map(|(value, help)| CompletionCandidate::new(value).help(Some(help.into())))
        .collect()
}

pub fn complete_account_name(current: &OsStr) -> Vec<CompletionCandidate> {
    matching(
        current,
        roster()
            .into_iter()
            .map(|account| (account.account_name, account.persona_name)),
    )
}

pub fn complete_steam_id(current: &OsStr) -> Vec<CompletionCandidate> {
    matching(
        current,
        roster().into_iter().filter_map(|account| {
            let id = account.steam_id?;
            Some((id, account.account_name))
        }),
    )
}

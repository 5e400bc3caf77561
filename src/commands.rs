use std::io;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;
use crate::credentials::system_credentials;
use crate::locate::SystemLocator;
use crate::manager::AccountManager;
use crate::paths::settings_db_path;
use crate::process::{LaunchSpec, SystemProcesses, format_command};
use crate::settings::SqliteSettings;
use crate::switch::SwitchTimings;

fn manager(steam_dir: Option<String>) -> Result<AccountManager> {
    let db_path = settings_db_path()?;
    let settings = SqliteSettings::open(&db_path)
        .with_context(|| format!("Opening settings at {}", db_path.display()))?;
    let credentials = system_credentials().context("Resolving auto-login store")?;

    Ok(AccountManager::new(
        Arc::new(SystemLocator::new(steam_dir)),
        credentials,
        Arc::new(SystemProcesses),
        Arc::new(settings),
        SwitchTimings::default(),
    ))
}

fn hours(minutes: u64) -> String {
    format!("{:.1}h", minutes as f64 / 60.0)
}

fn date(epoch_secs: u64) -> String {
    i64::try_from(epoch_secs)
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d").to_string())
}

pub async fn accounts(steam_dir: Option<String>, cached: bool) -> Result<()> {
    let manager = manager(steam_dir)?;

    if cached {
        let Some(roster) = manager.cached_roster().await? else {
            bail!("No saved roster yet; run `steamswitch accounts` first");
        };
        for (steam_id, fields) in roster.maps() {
            println!(
                "{}\t{}\t{}\t{}",
                steam_id,
                fields.get_str("AccountName").unwrap_or(""),
                fields.get_str("PersonaName").unwrap_or(""),
                fields.get_str("GameCount").unwrap_or("0"),
            );
        }
        return Ok(());
    }

    let records = manager
        .discover_accounts()
        .await
        .context("Reading Steam accounts")?;
    let auto_login = manager
        .client_status()
        .await
        .ok()
        .and_then(|status| status.auto_login);

    for record in records {
        let marker = if auto_login.as_deref() == Some(record.account_name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            marker,
            record.steam_id.as_deref().unwrap_or("-"),
            record.account_name,
            record.persona_name,
            record.stats.game_count,
            record.stats.friend_count,
            hours(record.stats.playtime_total_minutes),
            record.avatar,
        );
    }
    Ok(())
}

pub async fn path(steam_dir: Option<String>) -> Result<()> {
    let root = manager(steam_dir)?.install_path().await?;
    println!("{}", root.display());
    Ok(())
}

pub async fn games(steam_dir: Option<String>, installed: bool, steam_id: &str) -> Result<()> {
    let manager = manager(steam_dir)?;
    let root = manager.install_path().await?;
    let games = manager
        .load_games(steam_id, &root)
        .await
        .with_context(|| format!("Reading games for {steam_id}"))?;

    for game in games.iter().filter(|game| game.installed || !installed) {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            game.app_id,
            game.name,
            hours(game.playtime_forever_minutes),
            date(game.last_played),
            if game.installed { "installed" } else { "-" },
        );
    }
    Ok(())
}

pub async fn switch(dry_run: bool, steam_dir: Option<String>, account: &str) -> Result<()> {
    if dry_run {
        let root = SystemLocator::new(steam_dir).locate_now()?;
        let spec = LaunchSpec::steam_client(&root, Some(account.trim()));
        println!("{}", format_command(&spec.command()));
        return Ok(());
    }

    let result = manager(steam_dir)?.switch_account(account).await;
    if !result.success {
        bail!(
            "{}",
            result.error.as_deref().unwrap_or("Failed to switch account")
        );
    }

    println!("registry_set\t{}", result.registry_set);
    println!("steam_started\t{}", result.steam_started);
    println!("login_verified\t{}", result.login_verified);
    if let Some(message) = result.message {
        println!("{message}");
    }
    Ok(())
}

pub async fn status(steam_dir: Option<String>) -> Result<()> {
    let status = manager(steam_dir)?.client_status().await?;
    println!("running\t{}", status.running);
    println!("auto_login\t{}", status.auto_login.as_deref().unwrap_or("-"));
    Ok(())
}

pub async fn start(steam_dir: Option<String>) -> Result<()> {
    manager(steam_dir)?
        .start_client()
        .await
        .context("Starting Steam")
}

pub async fn stop() -> Result<()> {
    if !manager(None)?.stop_client().await.context("Stopping Steam")? {
        println!("Steam is not running");
    }
    Ok(())
}

pub fn completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "steamswitch", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_playtime_and_dates() {
        assert_eq!(hours(0), "0.0h");
        assert_eq!(hours(90), "1.5h");
        assert_eq!(date(0), "never");
        assert_eq!(date(1_700_000_000), "2023-11-14");
    }
}

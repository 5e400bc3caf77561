//! The operations the CLI drives: discovery, game listing and switching.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::credentials::CredentialStore;
use crate::error::{Error, ProcessError};
use crate::locate::InstallLocator;
use crate::process::{CLIENT_IMAGE, LaunchSpec, ProcessControl};
use crate::settings::{ACCOUNTS_KEY, STEAM_PATH_KEY, SettingsStore};
use crate::steam::accounts::{self, AccountFragment};
use crate::steam::avatar::{AvatarRef, resolve_avatar};
use crate::steam::keyvalues::{self, KeyValues, Value};
use crate::steam::stats::{self, AccountStats, GameRecord};
use crate::switch::{SwitchResult, SwitchTimings, Switcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub steam_id: Option<String>,
    pub account_name: String,
    pub persona_name: String,
    pub avatar: AvatarRef,
    pub stats: AccountStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub running: bool,
    pub auto_login: Option<String>,
}

pub struct AccountManager {
    locator: Arc<dyn InstallLocator>,
    credentials: Arc<dyn CredentialStore>,
    processes: Arc<dyn ProcessControl>,
    settings: Arc<dyn SettingsStore>,
    switcher: Switcher,
}

impl AccountManager {
    pub fn new(
        locator: Arc<dyn InstallLocator>,
        credentials: Arc<dyn CredentialStore>,
        processes: Arc<dyn ProcessControl>,
        settings: Arc<dyn SettingsStore>,
        timings: SwitchTimings,
    ) -> Self {
        let switcher = Switcher::new(
            Arc::clone(&locator),
            Arc::clone(&credentials),
            Arc::clone(&processes),
            timings,
        );
        Self {
            locator,
            credentials,
            processes,
            settings,
            switcher,
        }
    }

    pub async fn install_path(&self) -> Result<PathBuf, Error> {
        self.locator.locate().await
    }

    /// Reads the roster and builds one record per account, in file order.
    ///
    /// Stats and avatars degrade to defaults on their own; only a missing
    /// install or an unreadable roster fails the call.
    pub async fn discover_accounts(&self) -> Result<Vec<AccountRecord>, Error> {
        let steam_root = self.locator.locate().await?;
        let roster_path = steam_root.join("config").join("loginusers.vdf");

        let text = tokio::task::spawn_blocking(move || read_roster(&roster_path)).await??;
        let fragments = accounts::extract_accounts(&text);
        tracing::info!(count = fragments.len(), "Accounts found in roster");

        let builds: Vec<_> = fragments
            .into_iter()
            .map(|fragment| {
                let root = steam_root.clone();
                tokio::task::spawn_blocking(move || build_record(&root, fragment))
            })
            .collect();

        let mut records = Vec::with_capacity(builds.len());
        for build in builds {
            records.push(build.await?);
        }

        self.write_cache(&steam_root, &records).await;
        Ok(records)
    }

    async fn write_cache(&self, steam_root: &Path, records: &[AccountRecord]) {
        let settings = Arc::clone(&self.settings);
        let roster = roster_document(records).to_string();
        let path = steam_root.display().to_string();

        let written = tokio::task::spawn_blocking(move || {
            settings.set(ACCOUNTS_KEY, &roster)?;
            settings.set(STEAM_PATH_KEY, &path)
        })
        .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(%err, "Failed to cache roster"),
            Err(err) => tracing::warn!(%err, "Roster cache task failed"),
        }
    }

    /// The roster saved by the last discovery, if any.
    pub async fn cached_roster(&self) -> Result<Option<KeyValues>, Error> {
        let settings = Arc::clone(&self.settings);
        let Some(text) = tokio::task::spawn_blocking(move || settings.get(ACCOUNTS_KEY)).await??
        else {
            return Ok(None);
        };

        match keyvalues::try_parse(&text) {
            Ok(doc) => Ok(doc.get_map(ACCOUNTS_KEY).cloned()),
            Err(err) => {
                tracing::warn!(%err, "Cached roster is unreadable");
                Ok(None)
            }
        }
    }

    pub async fn load_games(
        &self,
        steam_id: &str,
        install_path: &Path,
    ) -> Result<Vec<GameRecord>, Error> {
        let steam_id = steam_id.to_string();
        let root = install_path.to_path_buf();
        tokio::task::spawn_blocking(move || stats::account_games(&root, &steam_id)).await?
    }

    pub async fn switch_account(&self, account_name: &str) -> SwitchResult {
        self.switcher.switch_account(account_name).await
    }

    pub async fn client_status(&self) -> Result<ClientStatus, Error> {
        let running = self.processes.is_running(CLIENT_IMAGE).await?;
        let auto_login = self.credentials.auto_login().await?;
        Ok(ClientStatus {
            running,
            auto_login,
        })
    }

    /// Starts the client with whatever account is set to auto-login.
    pub async fn start_client(&self) -> Result<(), Error> {
        let steam_root = self.locator.locate().await?;
        let spec = LaunchSpec::steam_client(&steam_root, None);
        self.processes.launch(&spec).await?;
        Ok(())
    }

    /// Returns whether a running client was stopped.
    pub async fn stop_client(&self) -> Result<bool, Error> {
        match self.processes.terminate(CLIENT_IMAGE).await {
            Ok(()) => Ok(true),
            Err(ProcessError::NotRunning(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_roster(path: &Path) -> Result<String, Error> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!(
            "Steam login users file not found at {}",
            path.display()
        ))),
        Err(err) => Err(Error::read(path, err)),
    }
}

fn build_record(steam_root: &Path, fragment: AccountFragment) -> AccountRecord {
    let (avatar, stats) = match fragment.steam_id.as_deref() {
        Some(id) => (resolve_avatar(steam_root, id), stats::account_stats(steam_root, id)),
        None => (AvatarRef::default(), AccountStats::default()),
    };
    AccountRecord {
        steam_id: fragment.steam_id,
        account_name: fragment.account_name,
        persona_name: fragment.persona_name,
        avatar,
        stats,
    }
}

/// The roster as a KeyValues document, keyed by steam id (or account name
/// when the id is unknown).
pub fn roster_document(records: &[AccountRecord]) -> KeyValues {
    let mut accounts = KeyValues::new();
    for record in records {
        let mut fields = KeyValues::new();
        fields.insert("AccountName", Value::Str(record.account_name.clone()));
        fields.insert("PersonaName", Value::Str(record.persona_name.clone()));
        fields.insert("Avatar", Value::Str(record.avatar.to_string()));
        fields.insert("GameCount", Value::Str(record.stats.game_count.to_string()));
        fields.insert("FriendCount", Value::Str(record.stats.friend_count.to_string()));
        fields.insert(
            "PlaytimeMinutes",
            Value::Str(record.stats.playtime_total_minutes.to_string()),
        );

        let key = record
            .steam_id
            .clone()
            .unwrap_or_else(|| record.account_name.clone());
        accounts.insert(key, Value::Map(fields));
    }

    let mut doc = KeyValues::new();
    doc.insert(ACCOUNTS_KEY, Value::Map(accounts));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SqliteSettings;
    use crate::switch::fakes::{CallLog, FixedLocator, MemoryCredentials, ScriptedProcesses};

    const ROSTER: &str = r#""users"
{
	"1"
	{
		"AccountName"		"alice"
	}
	"2"
	{
		"AccountName"		"bob"
		"PersonaName"		"Bobby"
	}
}
"#;

    struct Fixture {
        _root: tempfile::TempDir,
        settings: Arc<SqliteSettings>,
        log: CallLog,
        manager: AccountManager,
    }

    fn fixture(roster: Option<&str>) -> anyhow::Result<Fixture> {
        let root = tempfile::tempdir()?;
        if let Some(roster) = roster {
            fs::create_dir_all(root.path().join("config"))?;
            fs::write(root.path().join("config/loginusers.vdf"), roster)?;
        }
        let settings = Arc::new(SqliteSettings::in_memory()?);
        let log = CallLog::default();
        let manager = AccountManager::new(
            Arc::new(FixedLocator(Some(root.path().to_path_buf()))),
            Arc::new(MemoryCredentials::new(&log)),
            Arc::new(ScriptedProcesses::new(&log)),
            Arc::clone(&settings) as Arc<dyn SettingsStore>,
            SwitchTimings::default(),
        );
        Ok(Fixture {
            _root: root,
            settings,
            log,
            manager,
        })
    }

    #[tokio::test]
    async fn discovers_accounts_in_file_order_with_zero_stats() -> anyhow::Result<()> {
        let fx = fixture(Some(ROSTER))?;
        let records = fx.manager.discover_accounts().await?;

        assert_eq!(
            records,
            vec![
                AccountRecord {
                    steam_id: Some("1".to_string()),
                    account_name: "alice".to_string(),
                    persona_name: "alice".to_string(),
                    avatar: AvatarRef::default(),
                    stats: AccountStats::default(),
                },
                AccountRecord {
                    steam_id: Some("2".to_string()),
                    account_name: "bob".to_string(),
                    persona_name: "Bobby".to_string(),
                    avatar: AvatarRef::default(),
                    stats: AccountStats::default(),
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_discovery_is_identical() -> anyhow::Result<()> {
        let fx = fixture(Some(ROSTER))?;
        let first = fx.manager.discover_accounts().await?;
        let second = fx.manager.discover_accounts().await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn missing_roster_is_not_found() -> anyhow::Result<()> {
        let fx = fixture(None)?;
        assert!(matches!(
            fx.manager.discover_accounts().await,
            Err(Error::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn discovery_caches_roster_and_path() -> anyhow::Result<()> {
        let fx = fixture(Some(ROSTER))?;
        assert_eq!(fx.manager.cached_roster().await?, None);

        fx.manager.discover_accounts().await?;

        let root = fx.manager.install_path().await?;
        assert_eq!(
            fx.settings.get(STEAM_PATH_KEY)?,
            Some(root.display().to_string())
        );

        let cached = fx.manager.cached_roster().await?;
        let bob = cached.as_ref().and_then(|roster| roster.get_map("2"));
        assert_eq!(bob.and_then(|b| b.get_str("PersonaName")), Some("Bobby"));
        assert_eq!(bob.and_then(|b| b.get_str("GameCount")), Some("0"));
        Ok(())
    }

    #[tokio::test]
    async fn stop_reports_whether_client_was_running() -> anyhow::Result<()> {
        let fx = fixture(Some(ROSTER))?;
        assert!(fx.manager.stop_client().await?);
        fx.manager.start_client().await?;
        let log = fx.log.lock().await;
        let launch = log.last().map_or("", String::as_str);
        assert!(launch.starts_with("launch"));
        assert!(!launch.contains("-login"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn switch_updates_reported_auto_login() -> anyhow::Result<()> {
        let fx = fixture(Some(ROSTER))?;
        let result = fx.manager.switch_account("bob").await;
        assert!(result.login_verified);

        let status = fx.manager.client_status().await?;
        assert_eq!(
            status,
            ClientStatus {
                running: true,
                auto_login: Some("bob".to_string()),
            }
        );
        Ok(())
    }
}

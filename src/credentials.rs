//! The auto-login identity Steam reads at startup.
//!
//! Windows keeps it in `HKCU\Software\Valve\Steam`; Linux and macOS builds of
//! Steam emulate that key inside `registry.vdf`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Makes `account_name` the account Steam logs into without prompting.
    async fn set_auto_login(&self, account_name: &str) -> Result<(), Error>;

    async fn auto_login(&self) -> Result<Option<String>, Error>;
}

async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| Error::CredentialWrite(format!("credential task failed: {err}")))?
}

#[cfg(windows)]
pub fn system_credentials() -> Result<Arc<dyn CredentialStore>, Error> {
    Ok(Arc::new(windows::RegistryCredentials))
}

#[cfg(not(windows))]
pub fn system_credentials() -> Result<Arc<dyn CredentialStore>, Error> {
    let path = crate::locate::registry_vdf_path()?;
    Ok(Arc::new(vdf_registry::VdfRegistry::new(path)))
}

#[cfg(windows)]
mod windows {
    use async_trait::async_trait;
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};

    use super::{CredentialStore, blocking};
    use crate::error::Error;

    const STEAM_KEY: &str = "Software\\Valve\\Steam";

    pub struct RegistryCredentials;

    fn write(account_name: &str) -> Result<(), Error> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (key, _) = hkcu
            .create_subkey(STEAM_KEY)
            .map_err(|err| Error::CredentialWrite(format!("opening {STEAM_KEY}: {err}")))?;

        key.set_value("AutoLoginUser", &account_name)
            .map_err(|err| Error::CredentialWrite(format!("setting AutoLoginUser: {err}")))?;

        // Steam usually still logs in with only AutoLoginUser set.
        if let Err(err) = key.set_value("RememberPassword", &1u32) {
            tracing::warn!(%err, "Failed to set RememberPassword");
        }
        if let Err(err) = key.set_value("SkipOfflineModeWarning", &1u32) {
            tracing::warn!(%err, "Failed to set SkipOfflineModeWarning");
        }
        Ok(())
    }

    fn read() -> Result<Option<String>, Error> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let Ok(key) = hkcu.open_subkey_with_flags(STEAM_KEY, KEY_READ) else {
            return Ok(None);
        };
        Ok(key
            .get_value::<String, _>("AutoLoginUser")
            .ok()
            .filter(|name| !name.is_empty()))
    }

    #[async_trait]
    impl CredentialStore for RegistryCredentials {
        async fn set_auto_login(&self, account_name: &str) -> Result<(), Error> {
            let account_name = account_name.to_string();
            blocking(move || write(&account_name)).await
        }

        async fn auto_login(&self) -> Result<Option<String>, Error> {
            blocking(read).await
        }
    }
}

#[cfg(not(windows))]
mod vdf_registry {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;

    use super::{CredentialStore, blocking};
    use crate::error::Error;
    use crate::steam::keyvalues::{self, KeyValues};

    const STEAM_KEY: [&str; 5] = ["Registry", "HKCU", "Software", "Valve", "Steam"];

    /// Steam's emulated registry file.
    pub struct VdfRegistry {
        path: PathBuf,
    }

    impl VdfRegistry {
        pub fn new(path: PathBuf) -> Self {
            Self { path }
        }
    }

    fn load(path: &Path) -> Result<KeyValues, Error> {
        match fs::read_to_string(path) {
            Ok(content) => keyvalues::try_parse(&content).map_err(|err| {
                Error::CredentialWrite(format!(
                    "refusing to rewrite unreadable {}: {err}",
                    path.display()
                ))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(KeyValues::new()),
            Err(err) => Err(Error::CredentialWrite(format!(
                "reading {}: {err}",
                path.display()
            ))),
        }
    }

    fn write(path: &Path, account_name: &str) -> Result<(), Error> {
        let mut registry = load(path)?;

        let mut auto_login = STEAM_KEY.to_vec();
        auto_login.push("AutoLoginUser");
        registry.set_path(&auto_login, account_name);

        let mut remember = STEAM_KEY.to_vec();
        remember.push("RememberPassword");
        registry.set_path(&remember, "1");

        let write_err = |err: std::io::Error| {
            Error::CredentialWrite(format!("writing {}: {err}", path.display()))
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let staging = path.with_extension("vdf.tmp");
        fs::write(&staging, registry.to_string()).map_err(write_err)?;
        fs::rename(&staging, path).map_err(write_err)?;
        Ok(())
    }

    fn read(path: &Path) -> Result<Option<String>, Error> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::read(path, err)),
        };
        let registry = keyvalues::parse(&content);
        let steam = STEAM_KEY.iter().try_fold(&registry, |map, key| {
            map.get_map(key).or_else(|| map.get_map_ignore_case(key))
        });
        Ok(steam
            .and_then(|s| s.get_str("AutoLoginUser"))
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }

    #[async_trait]
    impl CredentialStore for VdfRegistry {
        async fn set_auto_login(&self, account_name: &str) -> Result<(), Error> {
            let path = self.path.clone();
            let account_name = account_name.to_string();
            blocking(move || write(&path, &account_name)).await
        }

        async fn auto_login(&self) -> Result<Option<String>, Error> {
            let path = self.path.clone();
            blocking(move || read(&path)).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const EXISTING: &str = r#""Registry"
{
	"HKCU"
	{
		"Software"
		{
			"Valve"
			{
				"Steam"
				{
					"AutoLoginUser"		"alice"
					"language"		"english"
				}
			}
		}
	}
}
"#;

        #[tokio::test]
        async fn rewrites_auto_login_and_keeps_other_values() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            let path = dir.path().join("registry.vdf");
            fs::write(&path, EXISTING)?;
            let store = VdfRegistry::new(path.clone());

            assert_eq!(store.auto_login().await?, Some("alice".to_string()));
            store.set_auto_login("bob").await?;
            assert_eq!(store.auto_login().await?, Some("bob".to_string()));

            let tree = keyvalues::try_parse(&fs::read_to_string(&path)?)?;
            let steam = tree.path(&STEAM_KEY);
            assert_eq!(steam.and_then(|s| s.get_str("language")), Some("english"));
            assert_eq!(steam.and_then(|s| s.get_str("RememberPassword")), Some("1"));
            Ok(())
        }

        #[tokio::test]
        async fn creates_missing_registry_file() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            let store = VdfRegistry::new(dir.path().join("nested/registry.vdf"));
            assert_eq!(store.auto_login().await?, None);
            store.set_auto_login("carol").await?;
            assert_eq!(store.auto_login().await?, Some("carol".to_string()));
            Ok(())
        }

        #[tokio::test]
        async fn refuses_to_clobber_corrupt_registry() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            let path = dir.path().join("registry.vdf");
            fs::write(&path, "\"Registry\" {")?;
            let store = VdfRegistry::new(path.clone());

            let result = store.set_auto_login("dave").await;
            assert!(matches!(result, Err(Error::CredentialWrite(_))));
            assert_eq!(fs::read_to_string(&path)?, "\"Registry\" {");
            Ok(())
        }
    }
}

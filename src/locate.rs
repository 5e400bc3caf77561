use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Error;

#[async_trait]
pub trait InstallLocator: Send + Sync {
    async fn locate(&self) -> Result<PathBuf, Error>;
}

/// Looks up the Steam install from the OS, unless a directory was given on
/// the command line. Nothing is cached between calls.
pub struct SystemLocator {
    steam_dir: Option<PathBuf>,
}

impl SystemLocator {
    pub fn new(steam_dir: Option<String>) -> Self {
        Self {
            steam_dir: steam_dir.map(PathBuf::from),
        }
    }

    pub fn locate_now(&self) -> Result<PathBuf, Error> {
        match &self.steam_dir {
            Some(dir) if dir.is_dir() => Ok(dir.clone()),
            Some(dir) => Err(Error::NotFound(format!(
                "Steam directory not found at {}",
                dir.display()
            ))),
            None => locate(),
        }
    }
}

#[async_trait]
impl InstallLocator for SystemLocator {
    async fn locate(&self) -> Result<PathBuf, Error> {
        self.locate_now()
    }
}

#[cfg(windows)]
pub fn locate() -> Result<PathBuf, Error> {
    use winreg::RegKey;
    use winreg::enums::HKEY_LOCAL_MACHINE;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    for key_path in ["SOFTWARE\\WOW6432Node\\Valve\\Steam", "SOFTWARE\\Valve\\Steam"] {
        let value = hklm
            .open_subkey(key_path)
            .and_then(|key| key.get_value::<String, _>("InstallPath"));
        match value {
            Ok(path) => return Ok(PathBuf::from(path)),
            Err(err) => tracing::debug!(key_path, %err, "Steam registry key unavailable"),
        }
    }

    Err(Error::NotFound(
        "Could not find Steam installation in registry".to_string(),
    ))
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn locate() -> Result<PathBuf, Error> {
    let home = home_dir()?;
    locate_under(&home)
}

#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
pub fn locate() -> Result<PathBuf, Error> {
    Err(Error::NotFound("Unsupported operating system".to_string()))
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn home_dir() -> Result<PathBuf, Error> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| Error::NotFound("Unable to resolve home directory".to_string()))
}

#[cfg(target_os = "linux")]
fn locate_under(home: &std::path::Path) -> Result<PathBuf, Error> {
    first_existing(
        &[home.join(".steam/steam"), home.join(".local/share/Steam")],
        "Could not find Steam installation on Linux",
    )
}

#[cfg(target_os = "macos")]
fn locate_under(home: &std::path::Path) -> Result<PathBuf, Error> {
    first_existing(
        &[home.join("Library/Application Support/Steam")],
        "Could not find Steam installation on macOS",
    )
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn first_existing(candidates: &[PathBuf], message: &str) -> Result<PathBuf, Error> {
    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .ok_or_else(|| Error::NotFound(message.to_string()))
}

/// Where Steam keeps its `registry.vdf` on systems without a Windows registry.
#[cfg(target_os = "linux")]
pub fn registry_vdf_path() -> Result<PathBuf, Error> {
    Ok(home_dir()?.join(".steam/registry.vdf"))
}

#[cfg(target_os = "macos")]
pub fn registry_vdf_path() -> Result<PathBuf, Error> {
    Ok(home_dir()?.join("Library/Application Support/Steam/registry.vdf"))
}

#[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
pub fn registry_vdf_path() -> Result<PathBuf, Error> {
    Err(Error::NotFound("Unsupported operating system".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_must_exist() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let found = SystemLocator::new(Some(dir.path().to_string_lossy().into_owned())).locate_now();
        assert_eq!(found.ok(), Some(dir.path().to_path_buf()));

        let missing = SystemLocator::new(Some(
            dir.path().join("gone").to_string_lossy().into_owned(),
        ))
        .locate_now();
        assert!(matches!(missing, Err(Error::NotFound(_))));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_prefers_dot_steam_then_local_share() -> std::io::Result<()> {
        let home = tempfile::tempdir()?;
        assert!(locate_under(home.path()).is_err());

        let local = home.path().join(".local/share/Steam");
        std::fs::create_dir_all(&local)?;
        assert_eq!(locate_under(home.path()).ok(), Some(local));

        let dot_steam = home.path().join(".steam/steam");
        std::fs::create_dir_all(&dot_steam)?;
        assert_eq!(locate_under(home.path()).ok(), Some(dot_steam));
        Ok(())
    }
}

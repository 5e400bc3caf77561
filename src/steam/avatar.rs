use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_AVATAR_URL: &str =
    "https://avatars.steamstatic.com/b5bd56c1aa4644a474a2e4972be27ef9e82e517e_full.jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarRef {
    File(PathBuf),
    Remote(String),
}

impl Default for AvatarRef {
    fn default() -> Self {
        Self::Remote(DEFAULT_AVATAR_URL.to_string())
    }
}

impl fmt::Display for AvatarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file://{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Newest readable image in `config/avatarcache` naming this account, or the
/// default CDN avatar.
#[must_use]
pub fn resolve_avatar(steam_root: &Path, steam_id: &str) -> AvatarRef {
    let cache_dir = steam_root.join("config").join("avatarcache");
    let entries = match fs::read_dir(&cache_dir) {
        Ok(entries) => entries,
        Err(_) => return AvatarRef::default(),
    };

    let short_id = steam_id
        .len()
        .checked_sub(8)
        .and_then(|start| steam_id.get(start..))
        .unwrap_or(steam_id);

    let mut candidates: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let is_image = name.ends_with(".png") || name.ends_with(".jpg");
            if !is_image || !(name.contains(steam_id) || name.contains(short_id)) {
                return None;
            }
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();

    // Newest first; name breaks ties so repeated scans agree.
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    match candidates.into_iter().next() {
        Some((_, path)) if File::open(&path).is_ok() => AvatarRef::File(path),
        Some((_, path)) => {
            tracing::debug!(path = %path.display(), "Cached avatar not readable");
            AvatarRef::default()
        }
        None => AvatarRef::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> std::io::Result<PathBuf> {
        let path = dir.join(name);
        let file = File::create(&path)?;
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))?;
        Ok(path)
    }

    #[test]
    fn picks_newest_matching_image() -> std::io::Result<()> {
        let root = tempfile::tempdir()?;
        let cache = root.path().join("config/avatarcache");
        fs::create_dir_all(&cache)?;
        touch(&cache, "76561198000000001.png", 500)?;
        let newest = touch(&cache, "00000001_small.jpg", 10)?;
        touch(&cache, "76561198000000001.txt", 0)?;
        touch(&cache, "76561198999999999.png", 0)?;

        assert_eq!(
            resolve_avatar(root.path(), "76561198000000001"),
            AvatarRef::File(newest)
        );
        Ok(())
    }

    #[test]
    fn falls_back_to_default_url() -> std::io::Result<()> {
        let root = tempfile::tempdir()?;
        let avatar = resolve_avatar(root.path(), "76561198000000001");
        assert_eq!(avatar, AvatarRef::default());
        assert_eq!(avatar.to_string(), DEFAULT_AVATAR_URL);
        Ok(())
    }
}

//! Per-account statistics and game lists read from the files Steam keeps
//! next to the roster. Every source is read on its own; a missing or broken
//! file zeroes only the numbers that come from it.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::steam::keyvalues::{self, Value};
use crate::steam::vdf::{AppActivity, AppState, UserLocalConfigStore};

/// Offset between a 64-bit SteamID and the 32-bit account id used for
/// `userdata` directory names.
const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountStats {
    pub game_count: u32,
    pub friend_count: u32,
    pub playtime_total_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub app_id: String,
    pub name: String,
    pub playtime_forever_minutes: u64,
    pub playtime_recent_minutes: u64,
    pub last_played: u64,
    pub installed: bool,
}

/// Reads a file, treating absence as `None`.
fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(Error::read(path, err)),
    }
}

/// `userdata/<id>`, or the directory named by the 32-bit account id when the
/// roster holds a 64-bit SteamID.
pub fn userdata_dir(steam_root: &Path, steam_id: &str) -> PathBuf {
    let userdata = steam_root.join("userdata");
    let direct = userdata.join(steam_id);
    if direct.is_dir() {
        return direct;
    }

    match steam_id.parse::<u64>() {
        Ok(id) if id > STEAM_ID64_BASE => {
            let converted = userdata.join((id - STEAM_ID64_BASE).to_string());
            if converted.is_dir() { converted } else { direct }
        }
        _ => direct,
    }
}

fn local_config_path(steam_root: &Path, steam_id: &str) -> PathBuf {
    userdata_dir(steam_root, steam_id).join("config/localconfig.vdf")
}

#[must_use]
pub fn account_stats(steam_root: &Path, steam_id: &str) -> AccountStats {
    AccountStats {
        game_count: or_zero("game count", library_app_count(steam_root)),
        friend_count: or_zero("friend count", friend_count(steam_root, steam_id)),
        playtime_total_minutes: or_zero("playtime", total_playtime(steam_root, steam_id)),
    }
}

fn or_zero<T: Default>(stat: &str, result: Result<T, Error>) -> T {
    result.unwrap_or_else(|err| {
        tracing::warn!(stat, %err, "Account statistic unavailable");
        T::default()
    })
}

fn library_folders_text(steam_root: &Path) -> Result<Option<String>, Error> {
    for relative in ["steamapps/libraryfolders.vdf", "config/libraryfolders.vdf"] {
        if let Some(content) = read_optional(&steam_root.join(relative))? {
            return Ok(Some(content));
        }
    }
    Ok(None)
}

/// Distinct app ids listed by every library folder.
fn library_app_count(steam_root: &Path) -> Result<u32, Error> {
    let Some(content) = library_folders_text(steam_root)? else {
        return Ok(0);
    };
    let doc = keyvalues::parse(&content);
    let Some(folders) = doc.get_map_ignore_case("libraryfolders") else {
        return Ok(0);
    };

    // Scalar entries (ContentStatsID, TimeNextStatsReport) are not folders.
    let apps: HashSet<&str> = folders
        .maps()
        .filter_map(|(_, folder)| folder.get_map("apps"))
        .flat_map(|apps| apps.iter().map(|(app_id, _)| app_id))
        .collect();

    Ok(u32::try_from(apps.len()).unwrap_or(u32::MAX))
}

/// Install root plus every library path from libraryfolders.vdf.
pub fn library_roots(steam_root: &Path) -> Vec<PathBuf> {
    let mut roots = vec![steam_root.to_path_buf()];
    let Ok(Some(content)) = library_folders_text(steam_root) else {
        return roots;
    };

    let doc = keyvalues::parse(&content);
    if let Some(folders) = doc.get_map_ignore_case("libraryfolders") {
        for (_, value) in folders.iter() {
            let path = match value {
                Value::Map(folder) => folder.get_str("path"),
                // Pre-2021 files list folders as plain index -> path pairs.
                Value::Str(path) if path.contains(['/', '\\']) => Some(path.as_str()),
                Value::Str(_) => None,
            };
            if let Some(path) = path {
                let path = PathBuf::from(path);
                if !roots.contains(&path) {
                    roots.push(path);
                }
            }
        }
    }
    roots
}

fn friend_count(steam_root: &Path, steam_id: &str) -> Result<u32, Error> {
    let path = userdata_dir(steam_root, steam_id).join("config/friends.vdf");
    let Some(content) = read_optional(&path)? else {
        return Ok(0);
    };
    let doc = keyvalues::parse(&content);
    let count = doc.get_map_ignore_case("friends").map_or(0, |f| f.len());
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

fn load_local_config(steam_root: &Path, steam_id: &str) -> Result<Option<UserLocalConfigStore>, Error> {
    let path = local_config_path(steam_root, steam_id);
    let Some(content) = read_optional(&path)? else {
        return Ok(None);
    };

    match keyvalues_serde::from_str::<UserLocalConfigStore>(&content) {
        Ok(config) => Ok(Some(config)),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "Failed to parse localconfig.vdf");
            Ok(None)
        }
    }
}

fn total_playtime(steam_root: &Path, steam_id: &str) -> Result<u64, Error> {
    let apps = load_local_config(steam_root, steam_id)?.and_then(|c| c.software.valve.steam.apps);
    Ok(apps
        .iter()
        .flat_map(|apps| apps.values())
        .map(AppActivity::playtime_forever_minutes)
        .sum())
}

/// Games this account has activity for, ordered by app id.
///
/// Names come from the app manifest of installed games; everything else gets
/// a `Game <appid>` placeholder since the binary appinfo cache is not read.
pub fn account_games(steam_root: &Path, steam_id: &str) -> Result<Vec<GameRecord>, Error> {
    let Some(config) = load_local_config(steam_root, steam_id)? else {
        return Ok(Vec::new());
    };
    let Some(apps) = config.software.valve.steam.apps else {
        return Ok(Vec::new());
    };

    let roots = library_roots(steam_root);
    let mut games: Vec<GameRecord> = apps
        .into_iter()
        .map(|(app_id, activity)| {
            let manifest = find_manifest(&roots, &app_id);
            let name = manifest
                .as_deref()
                .and_then(manifest_name)
                .unwrap_or_else(|| format!("Game {app_id}"));
            GameRecord {
                name,
                playtime_forever_minutes: activity.playtime_forever_minutes(),
                playtime_recent_minutes: activity.playtime_recent_minutes(),
                last_played: activity.last_played_epoch(),
                installed: manifest.is_some(),
                app_id,
            }
        })
        .collect();

    games.sort_by(|a, b| {
        a.app_id
            .parse::<u64>()
            .unwrap_or(u64::MAX)
            .cmp(&b.app_id.parse::<u64>().unwrap_or(u64::MAX))
            .then_with(|| a.app_id.cmp(&b.app_id))
    });

    Ok(games)
}

fn find_manifest(roots: &[PathBuf], app_id: &str) -> Option<PathBuf> {
    roots
        .iter()
        .map(|root| {
            root.join("steamapps")
                .join(format!("appmanifest_{}.acf", app_id))
        })
        .find(|path| path.exists())
}

fn manifest_name(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let manifest: AppState = keyvalues_serde::from_str(&content).ok()?;
    manifest.name.filter(|name| !name.is_empty())
}

use std::collections::HashMap;

use serde::Deserialize;

/// `steamapps/appmanifest_<appid>.acf`
#[derive(Debug, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub name: Option<String>,
}

/// `userdata/<id>/config/localconfig.vdf`
#[derive(Debug, Deserialize)]
pub struct UserLocalConfigStore {
    #[serde(rename = "Software")]
    pub software: LocalSoftwareConfig,
}

#[derive(Debug, Deserialize)]
pub struct LocalSoftwareConfig {
    #[serde(rename = "Valve")]
    pub valve: LocalValveConfig,
}

#[derive(Debug, Deserialize)]
pub struct LocalValveConfig {
    #[serde(rename = "Steam")]
    pub steam: LocalSteamSettings,
}

#[derive(Debug, Deserialize)]
pub struct LocalSteamSettings {
    pub apps: Option<HashMap<String, AppActivity>>,
}

/// Per-app counters. Steam stores them as strings; unparseable values count
/// as zero.
#[derive(Debug, Default, Deserialize)]
pub struct AppActivity {
    #[serde(default)]
    pub playtime_forever: Option<String>,
    #[serde(default)]
    pub playtime_2weeks: Option<String>,
    #[serde(rename = "LastPlayed", default)]
    pub last_played: Option<String>,
}

impl AppActivity {
    pub fn playtime_forever_minutes(&self) -> u64 {
        parse_counter(self.playtime_forever.as_deref())
    }

    pub fn playtime_recent_minutes(&self) -> u64 {
        parse_counter(self.playtime_2weeks.as_deref())
    }

    pub fn last_played_epoch(&self) -> u64 {
        parse_counter(self.last_played.as_deref())
    }
}

fn parse_counter(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

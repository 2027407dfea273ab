use std::{
    env, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const APP_DIR_NAME: &str = "liftlog";

/// The application directory: `explicit` when given, otherwise `liftlog` inside the platform state
/// directory. Created if missing.
pub fn data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir,
        None => platform_state_dir()?.join(APP_DIR_NAME),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

fn platform_state_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        return env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("APPDATA should be present on Windows"));
    }
    env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .ok_or_else(|| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Delay after the last edit of an entity before it is persisted.
    pub debounce_window_ms: u64,
    /// Offset of the timezone every calendar day is computed in.
    pub utc_offset_minutes: i32,
    pub owner: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_MS,
            utc_offset_minutes: 0,
            owner: "local".into(),
        }
    }
}

impl TrackerConfig {
    /// Reads the config at `path`. A missing file is not an error and yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Self::default()),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn sync_settings(&self) -> Result<SyncSettings> {
        let reference = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            anyhow!(
                "UTC offset of {} minutes is out of range",
                self.utc_offset_minutes
            )
        })?;
        Ok(SyncSettings {
            debounce_window: Duration::from_millis(self.debounce_window_ms),
            reference,
        })
    }
}

/// Settings shared by everything that keeps local state in sync with the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce_window: Duration,
    /// Canonical timezone for date keys and day buckets.
    pub reference: FixedOffset,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            reference: Utc.fix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{data_dir, TrackerConfig};

    #[test]
    fn explicit_data_dir_is_created() {
        let root = tempdir().unwrap();
        let dir = data_dir(Some(root.path().join("nested/liftlog"))).unwrap();
        assert!(dir.is_dir());
        assert_eq!(data_dir(Some(dir.clone())).unwrap(), dir);
    }

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = TrackerConfig::load(&dir.path().join("config.json"))
            .await
            .unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{ "utc_offset_minutes": 120 }"#)
            .await
            .unwrap();

        let config = TrackerConfig::load(&path).await.unwrap();
        assert_eq!(config.owner, "local");

        let settings = config.sync_settings().unwrap();
        assert_eq!(settings.reference.local_minus_utc(), 7200);
        assert_eq!(settings.debounce_window, Duration::from_secs(1));
    }

    #[test]
    fn rejects_impossible_offset() {
        let config = TrackerConfig {
            utc_offset_minutes: 60 * 30,
            ..Default::default()
        };
        assert!(config.sync_settings().is_err());
    }
}

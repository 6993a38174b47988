use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    #[default]
    Block,
    FailFast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub game_root: PathBuf,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub multi_hd_mode: bool,
    #[serde(default)]
    pub hd_link_folder: Option<PathBuf>,
    #[serde(default)]
    pub lock_policy: LockPolicy,
}

impl Settings {
    pub fn new(game_root: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            game_root: game_root.into(),
            data_dir: data_dir.into(),
            multi_hd_mode: false,
            hd_link_folder: None,
            lock_policy: LockPolicy::Block,
        }
    }

    pub fn load_or_create(game_root: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = default_data_dir()?;
        fs::create_dir_all(&data_dir).context("create data dir")?;
        let path = data_dir.join("settings.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read settings")?;
            let settings: Settings = serde_json::from_str(&raw).context("parse settings")?;
            return Ok(settings);
        }

        let settings = Settings::new(game_root, data_dir);
        settings.save()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("create data dir")?;
        let path = self.data_dir.join("settings.json");
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(path, raw).context("write settings")?;
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("InstallLog.xml")
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.data_dir.join("VirtualModConfig.xml")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    pub fn backups_root(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.data_dir.join("journal")
    }

    pub fn mirror_root(&self) -> Option<&Path> {
        if !self.multi_hd_mode {
            return None;
        }
        match &self.hd_link_folder {
            Some(folder) => Some(folder.as_path()),
            None => {
                warn!("multi-HD mode enabled without a link folder, treating as disabled");
                None
            }
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("modweave"))
}

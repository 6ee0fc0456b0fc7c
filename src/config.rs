use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::sequence::SequenceConfig;
use crate::step::{clamp_level, DEFAULT_STARTING_LEVEL};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub include_air_conduction: bool,
    pub include_bone_conduction: bool,
    pub starting_level: i32,
    /// Presentations a simulated run spends on one step before giving up on it
    pub max_presentations_per_step: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include_air_conduction: true,
            include_bone_conduction: true,
            starting_level: DEFAULT_STARTING_LEVEL,
            max_presentations_per_step: 30,
        }
    }
}

impl Config {
    pub fn sequence_config(&self) -> SequenceConfig {
        SequenceConfig {
            include_air: self.include_air_conduction,
            include_bone: self.include_bone_conduction,
            starting_level: clamp_level(self.starting_level),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Store at the default location, see [`AppDirs`]
    pub fn new() -> Self {
        Self {
            path: AppDirs::resolve().config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!(
                        "ignoring unreadable config {}: {}",
                        self.path.display(),
                        e
                    );
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(cfg)?)?;
        log::debug!("config written to {}", self.path.display());
        Ok(())
    }
}

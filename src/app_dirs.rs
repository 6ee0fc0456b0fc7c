use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;

/// When set, every audiosim file lives directly in this directory
pub const HOME_ENV: &str = "AUDIOSIM_HOME";

const CONFIG_FILE: &str = "config.json";
const HISTORY_FILE: &str = "history.db";

/// Where audiosim keeps its files: the config under the platform config
/// directory and the history database under local data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppDirs {
    pub fn resolve() -> Self {
        Self::with_override(env::var_os(HOME_ENV).map(PathBuf::from))
    }

    fn with_override(home: Option<PathBuf>) -> Self {
        if let Some(home) = home.filter(|h| !h.as_os_str().is_empty()) {
            return Self::rooted_at(home);
        }
        match ProjectDirs::from("", "", "audiosim") {
            Some(dirs) => Self {
                config_dir: dirs.config_dir().to_path_buf(),
                data_dir: dirs.data_local_dir().to_path_buf(),
            },
            None => Self::rooted_at("."),
        }
    }

    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.clone(),
            data_dir: root,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_holds_both_files() {
        let dirs = AppDirs::with_override(Some(PathBuf::from("/tmp/audiosim-home")));
        assert_eq!(dirs, AppDirs::rooted_at("/tmp/audiosim-home"));
        assert_eq!(
            dirs.config_path(),
            PathBuf::from("/tmp/audiosim-home/config.json")
        );
        assert_eq!(
            dirs.history_db_path(),
            PathBuf::from("/tmp/audiosim-home/history.db")
        );
    }

    #[test]
    fn empty_override_falls_back_to_platform_dirs() {
        let dirs = AppDirs::with_override(Some(PathBuf::new()));
        assert_eq!(dirs, AppDirs::with_override(None));
        assert!(dirs.config_path().ends_with(CONFIG_FILE));
        assert!(dirs.history_db_path().ends_with(HISTORY_FILE));
    }
}

use directories::ProjectDirs;
use std::path::PathBuf;

const SETTINGS_FILE: &str = "settings.json";

pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sieve-syntax").map(|d| d.config_dir().to_path_buf())
}

pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(SETTINGS_FILE))
}

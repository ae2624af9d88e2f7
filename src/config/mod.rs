pub mod paths;
pub mod settings;

pub use settings::{load_settings, load_settings_from, LogLevel, Settings, SettingsError};

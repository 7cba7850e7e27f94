use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_RECENT: usize = 5;
const MACRO_DIR_NAME: &str = "macros";

#[derive(Debug, Error)]
pub enum AppSettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings path unavailable")]
    MissingSettingsPath,
}

pub type Result<T> = std::result::Result<T, AppSettingsError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub last_image: Option<PathBuf>,
    #[serde(default)]
    pub macro_dir: Option<PathBuf>,
    #[serde(default)]
    pub recent_macros: Vec<PathBuf>,
}

impl AppSettings {
    pub fn load() -> Result<Self> {
        load_impl()
    }

    pub fn save(&self) -> Result<()> {
        save_impl(self)
    }

    /// Read settings from an explicit file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        std::fs::write(path, payload)?;
        Ok(())
    }

    pub fn last_image(&self) -> Option<PathBuf> {
        self.last_image.clone()
    }

    pub fn set_last_image(&mut self, path: PathBuf) {
        self.last_image = Some(path);
    }

    /// Where `.macro` files are kept: the configured directory, else
    /// `macros` under the platform config directory.
    pub fn macro_dir(&self) -> Result<PathBuf> {
        match &self.macro_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join(MACRO_DIR_NAME)),
        }
    }

    /// Newest first, no duplicates, at most five entries.
    pub fn record_macro(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.recent_macros.retain(|existing| existing != &path);
        self.recent_macros.insert(0, path);
        if self.recent_macros.len() > MAX_RECENT {
            self.recent_macros.truncate(MAX_RECENT);
        }
    }
}

#[cfg(target_os = "windows")]
fn load_impl() -> Result<AppSettings> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = hkcu
        .open_subkey_with_flags("Software\\ZenithEdit", KEY_READ)
        .ok();

    if let Some(key) = key {
        if let Ok(payload) = key.get_value::<String, _>("Settings") {
            return Ok(serde_json::from_str(&payload)?);
        }
    }

    Ok(AppSettings::default())
}

#[cfg(target_os = "windows")]
fn save_impl(settings: &AppSettings) -> Result<()> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_WRITE};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu.create_subkey_with_flags("Software\\ZenithEdit", KEY_WRITE)?;
    let payload = serde_json::to_string(settings)?;
    key.set_value("Settings", &payload)?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn load_impl() -> Result<AppSettings> {
    AppSettings::load_from(&settings_file_path()?)
}

#[cfg(not(target_os = "windows"))]
fn save_impl(settings: &AppSettings) -> Result<()> {
    settings.save_to(&settings_file_path()?)
}

#[cfg(not(target_os = "windows"))]
fn settings_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("settings.json"))
}

#[cfg(target_os = "macos")]
fn config_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new().ok_or(AppSettingsError::MissingSettingsPath)?;
    let mut path = base.home_dir().to_path_buf();
    path.push("Library");
    path.push("Preferences");
    path.push("com.zenithedit");
    Ok(path)
}

#[cfg(not(target_os = "macos"))]
fn config_dir() -> Result<PathBuf> {
    let base = directories::BaseDirs::new().ok_or(AppSettingsError::MissingSettingsPath)?;
    let mut path = base.config_dir().to_path_buf();
    path.push("ZenithEdit");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn recent_macros_are_deduplicated_and_capped() {
        let mut settings = AppSettings::default();
        for name in ["a", "b", "c", "d", "e", "f"] {
            settings.record_macro(format!("/m/{name}.macro"));
        }
        settings.record_macro("/m/c.macro");

        let names: Vec<_> = settings
            .recent_macros
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["/m/c.macro", "/m/f.macro", "/m/e.macro", "/m/d.macro", "/m/b.macro"]
        );
    }

    #[test]
    fn explicit_macro_dir_wins() {
        let settings = AppSettings {
            macro_dir: Some(PathBuf::from("/srv/macros")),
            ..AppSettings::default()
        };
        assert_eq!(settings.macro_dir().unwrap(), PathBuf::from("/srv/macros"));
    }

    #[test]
    fn settings_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        assert_eq!(AppSettings::load_from(&path).unwrap(), AppSettings::default());

        let mut settings = AppSettings::default();
        settings.set_last_image(PathBuf::from("/photos/cat.png"));
        settings.record_macro("/m/prep.macro");
        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn older_settings_files_load_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"last_image":"/x.png"}"#).unwrap();
        let settings = AppSettings::load_from(&path).unwrap();
        assert_eq!(settings.last_image(), Some(PathBuf::from("/x.png")));
        assert!(settings.recent_macros.is_empty());
    }
}

use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    /// Relative paths are taken from the app config directory.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "label_printer_ble".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// GATT layout and discovery policy of the target printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSettings {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_write_uuid")]
    pub write_char_uuid: String,
    /// Substring a device name must contain to be offered as a printer (case-sensitive).
    #[serde(default = "default_name_marker")]
    pub name_marker: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
}

impl PrinterSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            write_char_uuid: default_write_uuid(),
            name_marker: default_name_marker(),
            connect_timeout_ms: default_connect_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

fn default_service_uuid() -> String {
    protocol::PRINTER_SERVICE_UUID.to_string()
}
fn default_write_uuid() -> String {
    protocol::WRITE_CHAR_UUID.to_string()
}
fn default_name_marker() -> String {
    protocol::PRINTER_NAME_MARKER.to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_discovery_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub printer: PrinterSettings,

    /// Forces a platform profile ("ios", "android", ...) instead of the detected OS.
    #[serde(default)]
    pub platform_override: Option<String>,
}

/// Per-user directory holding the settings file and, by default, the logs.
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("LabelPrinterBle"))
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load_from(settings_path))
    }

    /// Load from an explicit path, falling back to defaults if the file is missing or invalid.
    pub fn load_from(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path =
            app_config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("label_printer_ble_{}_{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "printer": { "name_marker": "ZQ" } }"#).unwrap();
        assert_eq!(settings.printer.name_marker, "ZQ");
        assert_eq!(settings.printer.service_uuid, protocol::PRINTER_SERVICE_UUID);
        assert_eq!(settings.printer.connect_timeout_ms, 10_000);
        assert_eq!(settings.log_settings.level, "info");
        assert!(settings.platform_override.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_settings_path("roundtrip");
        let mut service = SettingsService::load_from(path.clone());
        service.get_mut().platform_override = Some("android".to_string());
        service.save().unwrap();

        let reloaded = SettingsService::load_from(path.clone());
        assert_eq!(reloaded.get().platform_override.as_deref(), Some("android"));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_unknown_printer_fields_are_ignored() {
        let settings: Settings = serde_json::from_str(
            r#"{ "printer": { "read_char_uuid": "38EB4A81-C570-11E3-9507-0002A5D5C51B" } }"#,
        )
        .unwrap();
        assert_eq!(settings.printer.write_char_uuid, protocol::WRITE_CHAR_UUID);
        let saved = serde_json::to_string(&settings).unwrap();
        assert!(!saved.contains("read_char_uuid"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let service = SettingsService::load_from(temp_settings_path("missing"));
        assert_eq!(service.get().printer.name_marker, protocol::PRINTER_NAME_MARKER);
    }
}

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindowScale {
    #[serde(rename = "4x")]
    X4,
    #[serde(rename = "8x")]
    #[default]
    X8,
    #[serde(rename = "12x")]
    X12,
    #[serde(rename = "16x")]
    X16,
}

impl WindowScale {
    pub fn factor(self) -> f32 {
        match self {
            Self::X4 => 4.0,
            Self::X8 => 8.0,
            Self::X12 => 12.0,
            Self::X16 => 16.0,
        }
    }

    pub const ALL: [WindowScale; 4] = [Self::X4, Self::X8, Self::X12, Self::X16];

    pub fn label(self) -> &'static str {
        match self {
            Self::X4 => "4x",
            Self::X8 => "8x",
            Self::X12 => "12x",
            Self::X16 => "16x",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub window_scale: WindowScale,
    pub gamepad_enabled: bool,
    pub audio_enabled: bool,
    /// Overrides the platform data dir for the ROM library.
    pub library_dir: Option<PathBuf>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            window_scale: WindowScale::default(),
            gamepad_enabled: true,
            audio_enabled: true,
            library_dir: None,
        }
    }
}

/// Directory that holds `ui.toml`, `keybinds.toml` and save states.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("multicade");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("multicade");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".config").join("multicade");
    }

    PathBuf::from(".")
}

pub fn default_ui_config_path() -> PathBuf {
    config_dir().join("ui.toml")
}

pub fn load_from_file(path: &PathBuf) -> UiConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return UiConfig::default(),
    };

    match toml::from_str::<UiConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse UI config {}: {e}; using defaults",
                path.display()
            );
            UiConfig::default()
        }
    }
}

pub fn save_to_file(path: &PathBuf, cfg: &UiConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).unwrap_or_else(|_| String::new());
    std::fs::write(path, text)
}

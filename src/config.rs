//! Compositor configuration
//!
//! Read from `$TINYWAY_CONFIG`, else `$XDG_CONFIG_HOME/tinyway/config.toml`
//! (falling back to `~/.config`). A missing file means defaults.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::backend::Mode;
use crate::error::Error;

/// Overrides the config file location
pub const CONFIG_ENV: &str = "TINYWAY_CONFIG";
/// Overrides the client command
pub const CLIENT_ENV: &str = "TINYWAY_CLIENT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the single seat
    pub seat_name: String,
    pub cursor: CursorConfig,
    pub client: ClientConfig,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seat_name: "seat0".to_string(),
            cursor: CursorConfig::default(),
            client: ClientConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Cursor theme; the default theme when unset
    pub theme: Option<String>,
    pub size: u32,
    /// Keep a client-set cursor image when the pointer moves
    pub keep_client_image: bool,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            theme: None,
            size: 32,
            keep_client_image: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Program launched once the socket is up; no client when unset
    pub command: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: Some("foot".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend to use; `TINYWAY_BACKEND` decides when unset
    pub name: Option<String>,
    /// Virtual outputs plugged in at startup
    pub outputs: Vec<OutputConfig>,
    /// Plug in a virtual pointer
    pub pointer: bool,
    /// Plug in a virtual keyboard
    pub keyboard: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: None,
            outputs: vec![OutputConfig::default()],
            pointer: true,
            keyboard: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub name: String,
    pub width: i32,
    pub height: i32,
    /// Refresh rate in mHz
    pub refresh: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "HEADLESS-1".to_string(),
            width: 1920,
            height: 1080,
            refresh: 60000,
        }
    }
}

impl OutputConfig {
    /// The single preferred mode of this output
    pub fn mode(&self) -> Mode {
        Mode {
            width: self.width,
            height: self.height,
            refresh: self.refresh,
            preferred: true,
        }
    }
}

impl Config {
    /// Load from the default location, applying environment overrides
    pub fn load() -> Result<Self, Error> {
        let mut config = match Self::path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!("No config at {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(command) = std::env::var(CLIENT_ENV) {
            config.client.command = (!command.is_empty()).then_some(command);
        }
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("tinyway").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.seat_name, "seat0");
        assert_eq!(config.cursor.size, 32);
        assert!(!config.cursor.keep_client_image);
        assert_eq!(config.client.command.as_deref(), Some("foot"));
        assert_eq!(config.backend.outputs.len(), 1);
        assert_eq!(config.backend.outputs[0].mode().refresh, 60000);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
seat_name = "seat1"

[cursor]
theme = "Adwaita"
keep_client_image = true

[backend]
name = "headless"
keyboard = false

[[backend.outputs]]
name = "HEADLESS-1"
width = 1280
height = 720

[[backend.outputs]]
name = "HEADLESS-2"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.seat_name, "seat1");
        assert_eq!(config.cursor.theme.as_deref(), Some("Adwaita"));
        assert_eq!(config.cursor.size, 32);
        assert!(config.cursor.keep_client_image);
        assert_eq!(config.backend.name.as_deref(), Some("headless"));
        assert!(config.backend.pointer);
        assert!(!config.backend.keyboard);
        assert_eq!(config.backend.outputs.len(), 2);
        assert_eq!(config.backend.outputs[0].width, 1280);
        assert_eq!(config.backend.outputs[1].width, 1920);
        assert_eq!(config.client.command.as_deref(), Some("foot"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seat_name = [").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }
}

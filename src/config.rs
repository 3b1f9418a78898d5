//! Persistent configuration: server port, overlay styling and target rule.

use crate::target::TargetConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Lowest port accepted from the control surface.
pub const MIN_PORT: u16 = 1000;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Main configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP port; takes effect on the next server start
    pub port: u16,

    /// Overlay rendering parameters, pushed live to connected overlays
    pub overlay: OverlayConfig,

    /// Which foreground window is captured
    pub target: TargetConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            overlay: OverlayConfig::default(),
            target: TargetConfig::default(),
        }
    }
}

/// Overlay rendering parameters. Display-only; capture never reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
    pub chip_bg: String,
    pub chip_fg: String,
    pub chip_gap: u32,
    pub chip_pad_v: u32,
    pub chip_pad_h: u32,
    pub chip_radius: u32,
    pub chip_font_px: u32,
    pub chip_font_weight: u32,
    /// Page background behind the chips
    pub background: String,
    pub cols: u32,
    pub rows: u32,
    pub single_line: bool,
    /// Percent, only applied when `single_line` is set
    pub single_line_scale: u32,
    /// left | center | right
    pub align: String,
    /// ltr | rtl
    pub direction: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            fade_in_ms: 120,
            fade_out_ms: 120,
            chip_bg: "rgba(0,0,0,0.6)".to_string(),
            chip_fg: "#ffffff".to_string(),
            chip_gap: 8,
            chip_pad_v: 10,
            chip_pad_h: 14,
            chip_radius: 10,
            chip_font_px: 24,
            chip_font_weight: 700,
            background: "rgba(0,0,0,0.0)".to_string(),
            cols: 8,
            rows: 1,
            single_line: false,
            single_line_scale: 90,
            align: "center".to_string(),
            direction: "ltr".to_string(),
        }
    }
}

impl OverlayConfig {
    /// Apply a partial update, clamping numbers to their documented ranges.
    ///
    /// Fields missing from `update` keep their current value and unknown keys
    /// are ignored. A field of the wrong JSON type rejects the whole update
    /// and leaves `self` untouched.
    pub fn merged(&self, update: &Map<String, Value>) -> Result<OverlayConfig, ConfigError> {
        let mut next = self.clone();

        next.fade_in_ms = int_field(update, "fade_in_ms", self.fade_in_ms, 0, None)?;
        next.fade_out_ms = int_field(update, "fade_out_ms", self.fade_out_ms, 0, None)?;
        next.chip_bg = string_field(update, "chip_bg", &self.chip_bg)?;
        next.chip_fg = string_field(update, "chip_fg", &self.chip_fg)?;
        next.chip_gap = int_field(update, "chip_gap", self.chip_gap, 0, None)?;
        next.chip_pad_v = int_field(update, "chip_pad_v", self.chip_pad_v, 0, None)?;
        next.chip_pad_h = int_field(update, "chip_pad_h", self.chip_pad_h, 0, None)?;
        next.chip_radius = int_field(update, "chip_radius", self.chip_radius, 0, None)?;
        next.chip_font_px = int_field(update, "chip_font_px", self.chip_font_px, 8, None)?;
        next.chip_font_weight =
            int_field(update, "chip_font_weight", self.chip_font_weight, 100, None)?;
        next.background = string_field(update, "background", &self.background)?;
        next.cols = int_field(update, "cols", self.cols, 1, None)?;
        next.rows = int_field(update, "rows", self.rows, 0, None)?;
        next.single_line = bool_field(update, "single_line", self.single_line)?;
        next.single_line_scale = int_field(
            update,
            "single_line_scale",
            self.single_line_scale,
            50,
            Some(120),
        )?;

        let align = string_field(update, "align", &self.align)?.to_lowercase();
        next.align = if ["left", "center", "right"].contains(&align.as_str()) {
            align
        } else {
            "center".to_string()
        };

        let direction = string_field(update, "direction", &self.direction)?.to_lowercase();
        next.direction = if ["ltr", "rtl"].contains(&direction.as_str()) {
            direction
        } else {
            "ltr".to_string()
        };

        Ok(next)
    }
}

/// Check a port requested through the control surface.
pub fn validate_port(port: i64) -> Result<u16, ConfigError> {
    if (i64::from(MIN_PORT)..=i64::from(u16::MAX)).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ConfigError::InvalidField {
            field: "port".to_string(),
            reason: format!("must be between {MIN_PORT} and {}", u16::MAX),
        })
    }
}

/// Read an integer field, accepting JSON numbers and numeric strings.
fn int_field(
    update: &Map<String, Value>,
    field: &str,
    current: u32,
    min: i64,
    max: Option<i64>,
) -> Result<u32, ConfigError> {
    let Some(value) = update.get(field) else {
        return Ok(current);
    };

    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let Some(raw) = parsed else {
        return Err(ConfigError::InvalidField {
            field: field.to_string(),
            reason: format!("expected an integer, got {value}"),
        });
    };

    let upper = max.unwrap_or(i64::from(u32::MAX));
    Ok(raw.clamp(min, upper) as u32)
}

fn string_field(
    update: &Map<String, Value>,
    field: &str,
    current: &str,
) -> Result<String, ConfigError> {
    match update.get(field) {
        None => Ok(current.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ConfigError::InvalidField {
            field: field.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn bool_field(update: &Map<String, Value>, field: &str, current: bool) -> Result<bool, ConfigError> {
    match update.get(field) {
        None => Ok(current),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(ConfigError::InvalidField {
            field: field.to_string(),
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

/// Loads and saves [`AppConfig`] as a JSON document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at the per-user default location.
    pub fn new() -> Self {
        Self::at(Self::default_path())
    }

    /// Store at a custom location.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the default configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyqueue")
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration. A missing or unreadable document yields the
    /// defaults; keys absent from the document are filled from the defaults.
    pub fn load(&self) -> AppConfig {
        match self.try_load() {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::debug!("No config at {:?}, using defaults", self.path);
                AppConfig::default()
            }
            Err(e) => {
                tracing::warn!("Ignoring config at {:?}: {e}", self.path);
                AppConfig::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<AppConfig>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(Some(config))
    }

    /// Save the configuration, replacing the previous document.
    ///
    /// The document is written to a sibling temp file first and renamed over
    /// the target, so readers never see a partial file.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::IoError(e.to_string()))?;
            }
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            ConfigError::IoError(e.to_string())
        })?;

        tracing::debug!("Saved config to {:?}", self.path);
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidField { field: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidField { field, reason } => {
                write!(f, "Invalid value for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetMode;
    use serde_json::json;

    fn update(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.overlay.cols, 8);
        assert_eq!(config.overlay.single_line_scale, 90);
        assert_eq!(config.target.mode, TargetMode::Disabled);
    }

    #[test]
    fn test_scale_and_align_clamped() {
        let overlay = OverlayConfig::default()
            .merged(&update(json!({"single_line_scale": 200, "align": "top"})))
            .unwrap();
        assert_eq!(overlay.single_line_scale, 120);
        assert_eq!(overlay.align, "center");

        let overlay = OverlayConfig::default()
            .merged(&update(json!({"single_line_scale": 10})))
            .unwrap();
        assert_eq!(overlay.single_line_scale, 50);
    }

    #[test]
    fn test_numeric_minimums() {
        let overlay = OverlayConfig::default()
            .merged(&update(json!({
                "chip_gap": -4,
                "chip_pad_v": -1,
                "chip_font_px": 2,
                "chip_font_weight": 50,
                "cols": 0,
                "rows": -3,
                "fade_in_ms": -10
            })))
            .unwrap();
        assert_eq!(overlay.chip_gap, 0);
        assert_eq!(overlay.chip_pad_v, 0);
        assert_eq!(overlay.chip_font_px, 8);
        assert_eq!(overlay.chip_font_weight, 100);
        assert_eq!(overlay.cols, 1);
        assert_eq!(overlay.rows, 0);
        assert_eq!(overlay.fade_in_ms, 0);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let base = OverlayConfig::default();
        let overlay = base
            .merged(&update(json!({"chip_bg": "#112233", "direction": "RTL", "extra": 1})))
            .unwrap();
        assert_eq!(overlay.chip_bg, "#112233");
        assert_eq!(overlay.direction, "rtl");
        assert_eq!(overlay.chip_fg, base.chip_fg);
        assert_eq!(overlay.cols, base.cols);
    }

    #[test]
    fn test_invalid_direction_defaults_to_ltr() {
        let overlay = OverlayConfig::default()
            .merged(&update(json!({"direction": "up"})))
            .unwrap();
        assert_eq!(overlay.direction, "ltr");
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let overlay = OverlayConfig::default()
            .merged(&update(json!({"cols": "4", "chip_font_px": 18.9})))
            .unwrap();
        assert_eq!(overlay.cols, 4);
        assert_eq!(overlay.chip_font_px, 18);
    }

    #[test]
    fn test_wrong_type_rejected_with_field() {
        let err = OverlayConfig::default()
            .merged(&update(json!({"cols": "wide"})))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { ref field, .. } if field == "cols"));

        let err = OverlayConfig::default()
            .merged(&update(json!({"single_line": "yes"})))
            .unwrap_err();
        assert!(err.to_string().contains("single_line"));
    }

    #[test]
    fn test_port_validation() {
        assert_eq!(validate_port(9001), Ok(9001));
        assert_eq!(validate_port(1000), Ok(1000));
        assert_eq!(validate_port(65535), Ok(65535));
        assert!(validate_port(999).is_err());
        assert!(validate_port(65536).is_err());
        assert!(validate_port(-1).is_err());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("nested").join("config.json"));

        let overlay = OverlayConfig {
            chip_bg: "#000000".to_string(),
            cols: 3,
            single_line: true,
            single_line_scale: 110,
            align: "right".to_string(),
            direction: "rtl".to_string(),
            ..OverlayConfig::default()
        };
        let config = AppConfig {
            port: 9001,
            overlay,
            target: TargetConfig::new(TargetMode::Process, Some("obs64.exe".to_string())),
        };

        store.save(&config).unwrap();
        assert_eq!(store.load(), config);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));
        assert_eq!(store.load(), AppConfig::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ConfigStore::at(&path).load(), AppConfig::default());
    }

    #[test]
    fn test_missing_keys_default_filled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"port": 9100, "overlay": {"cols": 5}}"#).unwrap();

        let config = ConfigStore::at(&path).load();
        assert_eq!(config.port, 9100);
        assert_eq!(config.overlay.cols, 5);
        assert_eq!(config.overlay.chip_font_px, 24);
        assert_eq!(config.target, TargetConfig::default());
    }
}

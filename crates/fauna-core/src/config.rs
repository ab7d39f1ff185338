//! Viewer configuration loading and validation

use bevy_math::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;
use crate::model::{default_specs, ModelRegistry, SubModelSpec};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_specs")]
    pub models: Vec<SubModelSpec>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            placement: PlacementConfig::default(),
            preview: PreviewConfig::default(),
            camera: CameraConfig::default(),
            session: SessionConfig::default(),
            models: default_specs(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Minimum gap between two accepted placement requests
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Hide the reticle once an instance is placed (disables re-placement)
    #[serde(default)]
    pub hide_reticle_when_placed: bool,
    /// Start placed instances with the scale/rotation the preview had
    /// instead of resetting them to identity
    #[serde(default)]
    pub carry_over_transform: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            hide_reticle_when_placed: false,
            carry_over_transform: false,
        }
    }
}

impl PlacementConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    160
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Where the prefab sits in front of the fallback camera
    #[serde(default = "default_home_position")]
    pub home_position: [f32; 3],
    /// Radians added to the prefab's yaw on each fallback frame
    #[serde(default = "default_spin")]
    pub spin_per_frame: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            home_position: default_home_position(),
            spin_per_frame: default_spin(),
        }
    }
}

impl PreviewConfig {
    pub fn home(&self) -> Vec3 {
        Vec3::from_array(self.home_position)
    }
}

fn default_home_position() -> [f32; 3] {
    [0.0, 1.5, -3.0]
}

fn default_spin() -> f32 {
    0.01
}

/// Fallback (non-AR) camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_camera_position")]
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            position: default_camera_position(),
        }
    }
}

fn default_fov() -> f32 {
    70.0
}

fn default_near() -> f32 {
    0.01
}

fn default_far() -> f32 {
    50.0
}

fn default_camera_position() -> [f32; 3] {
    [0.0, 1.6, 0.0]
}

/// Options passed when requesting the immersive AR session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_reference_space")]
    pub reference_space: String,
    #[serde(default = "default_required_features")]
    pub required_features: Vec<String>,
    #[serde(default = "default_optional_features")]
    pub optional_features: Vec<String>,
    /// Element id used as the DOM overlay root
    #[serde(default = "default_overlay_root")]
    pub overlay_root: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_space: default_reference_space(),
            required_features: default_required_features(),
            optional_features: default_optional_features(),
            overlay_root: default_overlay_root(),
        }
    }
}

fn default_reference_space() -> String {
    "local".to_string()
}

fn default_required_features() -> Vec<String> {
    vec!["hit-test".to_string(), "anchors".to_string()]
}

fn default_optional_features() -> Vec<String> {
    vec!["dom-overlay".to_string(), "local".to_string()]
}

fn default_overlay_root() -> String {
    "overlayRoot".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl ViewerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, or defaults if the file doesn't exist.
    ///
    /// For native tooling; the wasm viewer parses its embedded copy with
    /// [`ViewerConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry()?;

        if !(self.camera.fov_degrees > 0.0 && self.camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera fov {} out of range",
                self.camera.fov_degrees
            )));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(ConfigError::Invalid(format!(
                "camera clip planes {}..{} are invalid",
                self.camera.near, self.camera.far
            )));
        }
        if !self.preview.spin_per_frame.is_finite() {
            return Err(ConfigError::Invalid("preview spin must be finite".to_string()));
        }
        if self.session.reference_space.is_empty() {
            return Err(ConfigError::Invalid("reference space type is empty".to_string()));
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        ModelRegistry::new(self.models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubModelKind;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ViewerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.placement.debounce(), Duration::from_millis(160));
        assert_eq!(config.preview.home(), Vec3::new(0.0, 1.5, -3.0));
        assert_eq!(config.session.required_features, vec!["hit-test", "anchors"]);
    }

    #[test]
    fn test_partial_override() {
        let config = ViewerConfig::from_toml_str(
            r#"
            [placement]
            debounce_ms = 250
            hide_reticle_when_placed = true

            [preview]
            spin_per_frame = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.placement.debounce_ms, 250);
        assert!(config.placement.hide_reticle_when_placed);
        assert!(!config.placement.carry_over_transform);
        assert_eq!(config.preview.spin_per_frame, 0.0);
        assert_eq!(config.preview.home_position, [0.0, 1.5, -3.0]);
        assert_eq!(config.camera.fov_degrees, 70.0);
    }

    #[test]
    fn test_models_must_cover_every_kind() {
        let result = ViewerConfig::from_toml_str(
            r#"
            [[models]]
            kind = "primary"
            label = "Elephant"
            path = "a.glb"
            offset = [0.0, 0.0, 0.0]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_camera_rejected() {
        let result = ViewerConfig::from_toml_str(
            r#"
            [camera]
            near = 5.0
            far = 1.0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fauna.toml");

        let mut config = ViewerConfig::default();
        config.models[1].label = "Bones".to_string();
        config.models[1].offset = [2.0, 0.0, 0.0];
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = ViewerConfig::load(&path).unwrap();
        let registry = loaded.registry().unwrap();
        assert_eq!(registry.get(SubModelKind::Alt1).label, "Bones");
        assert_eq!(registry.get(SubModelKind::Alt1).home_offset(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = ViewerConfig::load(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, ViewerConfig::default());
    }
}

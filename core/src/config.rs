//! Renderer configuration (`renderer.toml`)
//!
//! Every field has a default, so an empty or partial file is valid. Values are checked by
//! [`RendererConfig::validate`] when loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batch::{DEFAULT_INDEX_CAPACITY, DEFAULT_VERTEX_CAPACITY};
use crate::error::ConfigError;
use crate::state::FilterOverride;

/// Far plane used when view distance is unlimited
pub const UNLIMITED_Z_FAR: f32 = 65536.0;

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RendererConfig {
    /// Geometry batching
    #[serde(default)]
    pub batch: BatchConfig,
    /// Texture caching and filtering
    #[serde(default)]
    pub texture: TextureConfig,
    /// Output settings
    #[serde(default)]
    pub display: DisplayConfig,
    /// Projection settings
    #[serde(default)]
    pub view: ViewConfig,
}

/// Batch buffer sizes. Fixed for the lifetime of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Vertices per batch (default: 20000)
    #[serde(default = "default_vertex_capacity")]
    pub vertex_capacity: u32,
    /// Indices per batch (default: 60000)
    #[serde(default = "default_index_capacity")]
    pub index_capacity: u32,
}

/// Texture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureConfig {
    /// Convert textures when the engine precaches them instead of on first draw (default: true)
    #[serde(default = "default_true")]
    pub precache: bool,
    /// Filter override (default: auto)
    #[serde(default)]
    pub filter: FilterOverride,
    /// Share one texture store between all contexts (default: true)
    #[serde(default = "default_true")]
    pub shared_store: bool,
}

/// Display configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Output brightness, 0.5 is neutral (default: 0.5, range: 0.0-1.0)
    #[serde(default = "default_brightness")]
    pub brightness: f32,
    /// Whether to wait for vertical sync (default: true)
    #[serde(default = "default_true")]
    pub vsync: bool,
    /// Render target width (default: 1024)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Render target height (default: 768)
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Projection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Horizontal field of view in degrees (default: 90)
    #[serde(default = "default_fov")]
    pub fov: f32,
    /// Near plane (default: 0.5)
    #[serde(default = "default_z_near")]
    pub z_near: f32,
    /// Far plane (default: 32760)
    #[serde(default = "default_z_far")]
    pub z_far: f32,
    /// Replace the far plane with 65536 (default: false)
    #[serde(default)]
    pub unlimited_view_distance: bool,
}

fn default_vertex_capacity() -> u32 {
    DEFAULT_VERTEX_CAPACITY
}
fn default_index_capacity() -> u32 {
    DEFAULT_INDEX_CAPACITY
}

fn default_true() -> bool {
    true
}
fn default_brightness() -> f32 {
    0.5
}
fn default_width() -> u32 {
    1024
}
fn default_height() -> u32 {
    768
}

fn default_fov() -> f32 {
    90.0
}
fn default_z_near() -> f32 {
    0.5
}
fn default_z_far() -> f32 {
    32760.0
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            vertex_capacity: default_vertex_capacity(),
            index_capacity: default_index_capacity(),
        }
    }
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            precache: default_true(),
            filter: FilterOverride::default(),
            shared_store: default_true(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            vsync: default_true(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            z_near: default_z_near(),
            z_far: default_z_far(),
            unlimited_view_distance: false,
        }
    }
}

impl ViewConfig {
    /// Far plane after applying `unlimited_view_distance`
    pub fn effective_z_far(&self) -> f32 {
        if self.unlimited_view_distance {
            UNLIMITED_Z_FAR
        } else {
            self.z_far
        }
    }
}

impl RendererConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: RendererConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject unusable values and clamp brightness into range.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.batch.vertex_capacity < 4 || self.batch.index_capacity < 6 {
            return Err(ConfigError::Invalid(format!(
                "batch must hold at least one quad, got {} vertices / {} indices",
                self.batch.vertex_capacity, self.batch.index_capacity
            )));
        }
        if !(self.view.z_near > 0.0 && self.view.z_near < self.view.effective_z_far()) {
            return Err(ConfigError::Invalid(format!(
                "z_near {} must be positive and below z_far {}",
                self.view.z_near,
                self.view.effective_z_far()
            )));
        }
        if !(1.0..180.0).contains(&self.view.fov) {
            return Err(ConfigError::Invalid(format!(
                "fov {} must be between 1 and 180 degrees",
                self.view.fov
            )));
        }
        self.display.brightness = self.display.brightness.clamp(0.0, 1.0);
        Ok(())
    }
}

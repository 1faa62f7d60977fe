//! Configuration options for umbra.

use std::path::Path;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UmbraError};
use crate::volume::DEFAULT_MULTIPLIER;

/// Point light used by the shadow passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightOptions {
    /// World-space position.
    pub position: Vec3,
    pub color: Vec3,
    /// Fraction of the base colour shown in the ambient pass.
    pub ambient: f32,
}

impl Default for LightOptions {
    fn default() -> Self {
        Self {
            position: Vec3::new(5.0, 10.0, 5.0),
            color: Vec3::ONE,
            ambient: 0.2,
        }
    }
}

/// Initial camera placement and projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    /// Refit eye and center to the model bounds after loading.
    pub fit_to_model: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            eye: Vec3::new(3.0, 4.0, 8.0),
            center: Vec3::new(-5.0, -3.0, 0.0),
            up: Vec3::Y,
            fov_degrees: 50.0,
            near: 0.1,
            fit_to_model: false,
        }
    }
}

/// Shadow-volume generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeOptions {
    /// Output capacity as a multiple of the source vertex count.
    pub multiplier: u32,
    /// How far near-cap vertices are pushed away from the light, in view units.
    pub near_bias: f32,
    /// Read the append counters back every frame and warn on overflow.
    pub diagnostics: bool,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            near_bias: 1e-3,
            diagnostics: false,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Colour the ambient pass clears to.
    pub background_color: Vec4,
    pub light: LightOptions,
    pub camera: CameraOptions,
    pub volume: VolumeOptions,
    pub window_width: u32,
    pub window_height: u32,
    /// Seconds between FPS log lines (0 disables them).
    pub fps_log_interval: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            background_color: Vec4::new(0.3, 0.3, 0.3, 1.0),
            light: LightOptions::default(),
            camera: CameraOptions::default(),
            volume: VolumeOptions::default(),
            window_width: 1280,
            window_height: 720,
            fps_log_interval: 5.0,
        }
    }
}

impl Options {
    /// Parses options from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(UmbraError::Config)
    }

    /// Reads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loaded options from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Width over height of the configured window.
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.window_width.max(1) as f32 / self.window_height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = Options::default();
        assert_eq!(o.background_color, Vec4::new(0.3, 0.3, 0.3, 1.0));
        assert_eq!(o.volume.multiplier, 14);
        assert_eq!(o.camera.fov_degrees, 50.0);
        assert_eq!(o.camera.eye, Vec3::new(3.0, 4.0, 8.0));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let o = Options::from_json_str(
            r#"{"volume":{"multiplier":6},"light":{"position":[0,5,0]}}"#,
        )
        .unwrap();
        assert_eq!(o.volume.multiplier, 6);
        assert!(!o.volume.diagnostics);
        assert_eq!(o.light.position, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(o.light.ambient, LightOptions::default().ambient);
        assert_eq!(o.window_width, 1280);
    }

    #[test]
    fn test_bad_json() {
        let err = Options::from_json_str("{").unwrap_err();
        assert!(err.is_config(), "{err}");
        assert!(!err.is_format());
        let err = Options::from_json_str(r#"{"volume":{"multiplier":"many"}}"#).unwrap_err();
        assert!(err.is_config(), "{err}");
    }

    #[test]
    fn test_missing_file() {
        let err = Options::load("/nonexistent/umbra.json").unwrap_err();
        assert!(matches!(err, crate::UmbraError::Io(_)));
    }
}

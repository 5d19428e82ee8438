// config.rs — mirror, warped image and viewer configuration
//
// Defaults describe the reference equiangular mirror (GoPano Plus class) on a
// 16:9 source frame. Every field may be overridden from a JSON file; missing
// fields keep their defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Keeps the far wall of the sphere strictly inside the depth range.
const FAR_PLANE_PADDING: f32 = 1.01;

/// Vertical field of view of the mirror, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub lower_limit: f32,
    pub range: f32,
}

impl MirrorConfig {
    pub fn upper_limit(&self) -> f32 {
        self.lower_limit + self.range
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            lower_limit: -58.0,
            range: 110.0,
        }
    }
}

/// Position of the warped mirror image inside the source frame, normalized.
///
/// `radius` runs from `center` (bottom of the mirror) to the image of the
/// mirror's top edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpedImageConfig {
    pub center: [f32; 2],
    pub radius: [f32; 2],
}

impl Default for WarpedImageConfig {
    fn default() -> Self {
        Self {
            center: [0.495, 0.50],
            radius: [0.25, 0.45],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub initial_fov: f32,
    pub min_fov: f32,
    /// `None` derives the widest FOV that still fits the mirror when looking at the equator.
    pub max_fov: Option<f32>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            initial_fov: 75.0,
            min_fov: 10.0,
            max_fov: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f32,
    pub latitude_bands: u32,
    pub longitude_bands: u32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            radius: 500.0,
            latitude_bands: 90,
            longitude_bands: 90,
        }
    }
}

/// Idle orbit around the outside of the sphere before the first interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub radius: f32,
    /// Degrees per tick.
    pub speed: f32,
    /// Radius units per tick while moving into the sphere.
    pub approach_step: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            radius: 900.0,
            speed: 0.5,
            approach_step: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionsConfig {
    pub fade_frames: u32,
}

impl Default for InstructionsConfig {
    fn default() -> Self {
        Self { fade_frames: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Fixed drag sensitivity. `None` scales with the current FOV so one
    /// viewport height of drag covers one FOV.
    pub drag_degrees_per_pixel: Option<f32>,
    /// FOV degrees per wheel line. Scrolling up zooms in.
    pub zoom_degrees_per_line: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            drag_degrees_per_pixel: None,
            zoom_degrees_per_line: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwarpConfig {
    pub mirror: MirrorConfig,
    pub warped_image: WarpedImageConfig,
    /// 1.0 shows the unwarped scene as seen, -1.0 mirrors it.
    pub horizontal_scale: f32,
    pub view: ViewConfig,
    pub sphere: SphereConfig,
    pub orbit: OrbitConfig,
    pub instructions: InstructionsConfig,
    pub input: InputConfig,
    pub near_plane: f32,
}

impl Default for UnwarpConfig {
    fn default() -> Self {
        Self {
            mirror: MirrorConfig::default(),
            warped_image: WarpedImageConfig::default(),
            horizontal_scale: 1.0,
            view: ViewConfig::default(),
            sphere: SphereConfig::default(),
            orbit: OrbitConfig::default(),
            instructions: InstructionsConfig::default(),
            input: InputConfig::default(),
            near_plane: 1.0,
        }
    }
}

impl UnwarpConfig {
    /// Reads a JSON config. The result is validated before it is returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: UnwarpConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn max_fov(&self) -> f32 {
        self.view.max_fov.unwrap_or_else(|| {
            self.mirror.lower_limit.abs().min(self.mirror.upper_limit()) * 2.0
        })
    }

    /// Just past the far wall of the sphere seen from the orbit.
    pub fn far_plane(&self) -> f32 {
        (self.sphere.radius + self.orbit.radius) * FAR_PLANE_PADDING
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mirror = &self.mirror;
        if !(mirror.range > 0.0) {
            return Err(ConfigError::MirrorRange(mirror.range));
        }
        if mirror.lower_limit < -90.0 || mirror.upper_limit() > 90.0 {
            return Err(ConfigError::MirrorLimits {
                lower: mirror.lower_limit,
                upper: mirror.upper_limit(),
            });
        }

        let [cx, cy] = self.warped_image.center;
        if !(0.0..=1.0).contains(&cx) || !(0.0..=1.0).contains(&cy) {
            return Err(ConfigError::WarpedCenter { x: cx, y: cy });
        }
        let [rx, ry] = self.warped_image.radius;
        if !(rx > 0.0 && ry > 0.0) {
            return Err(ConfigError::WarpedRadius { x: rx, y: ry });
        }

        if self.horizontal_scale != 1.0 && self.horizontal_scale != -1.0 {
            return Err(ConfigError::HorizontalScale(self.horizontal_scale));
        }

        let (min, max, initial) = (self.view.min_fov, self.max_fov(), self.view.initial_fov);
        if !(min > 0.0) {
            return Err(ConfigError::FieldOfView(format!("min {min} must be > 0")));
        }
        if min > max {
            return Err(ConfigError::FieldOfView(format!("min {min} exceeds max {max}")));
        }
        if max > mirror.range {
            return Err(ConfigError::FieldOfView(format!(
                "max {max} exceeds mirror range {}",
                mirror.range
            )));
        }
        if !(min..=max).contains(&initial) {
            return Err(ConfigError::FieldOfView(format!(
                "initial {initial} outside [{min}, {max}]"
            )));
        }

        let sphere = &self.sphere;
        if !(sphere.radius > 0.0) {
            return Err(ConfigError::Tessellation(format!(
                "sphere radius {} must be > 0",
                sphere.radius
            )));
        }
        if sphere.latitude_bands == 0 || sphere.longitude_bands == 0 {
            return Err(ConfigError::Tessellation("band counts must be > 0".into()));
        }
        let vertices = (sphere.latitude_bands as u64 + 1) * (sphere.longitude_bands as u64 + 1);
        if vertices > u32::MAX as u64 {
            return Err(ConfigError::Tessellation(format!(
                "{vertices} vertices do not fit 32-bit indices"
            )));
        }
        let (first, last) = crate::mesh::latitude_band_range(mirror, sphere.latitude_bands);
        if first >= last {
            return Err(ConfigError::Tessellation(format!(
                "mirror range {} is narrower than one latitude band",
                mirror.range
            )));
        }

        let orbit = &self.orbit;
        if !(orbit.radius >= 0.0) {
            return Err(ConfigError::Orbit(format!("radius {} must be >= 0", orbit.radius)));
        }
        if !(orbit.approach_step > 0.0) {
            return Err(ConfigError::Orbit(format!(
                "approach step {} must be > 0",
                orbit.approach_step
            )));
        }
        if !orbit.speed.is_finite() {
            return Err(ConfigError::Orbit("speed must be finite".into()));
        }

        if self.instructions.fade_frames == 0 {
            return Err(ConfigError::FadeFrames);
        }
        if !(self.near_plane > 0.0 && self.near_plane < self.far_plane()) {
            return Err(ConfigError::Tessellation(format!(
                "near plane {} must lie in (0, {})",
                self.near_plane,
                self.far_plane()
            )));
        }
        Ok(())
    }
}

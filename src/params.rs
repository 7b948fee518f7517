use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampling::Sampling;

/// Lower bound of the zoom control exposed by the front ends.
pub const MIN_ZOOM: f64 = 0.1;
/// Upper bound of the zoom control exposed by the front ends.
pub const MAX_ZOOM: f64 = 2.0;
/// Tilt, pan and roll controls span `[-MAX_ANGLE, MAX_ANGLE]` degrees.
pub const MAX_ANGLE: f64 = 180.0;

/// Everything one remap invocation needs besides the source raster.
///
/// The same value is used for every frame of a video export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionParameters {
    /// In-plane rotation of the dome around its center.
    pub rotation_degrees: f64,
    /// Scales the disc radius before it becomes a polar angle. Values above
    /// 1 reach past the horizon unless `clamp_hemisphere` is set.
    pub zoom_factor: f64,
    /// Rotation around the X axis, applied first.
    pub tilt_degrees: f64,
    /// Rotation around the Y axis, applied second.
    pub pan_degrees: f64,
    /// Rotation around the Z axis, applied last.
    pub roll_degrees: f64,
    /// Mirror the source columns before remapping.
    pub flip_horizontal: bool,
    /// Mirror the source rows before remapping.
    pub flip_vertical: bool,
    pub sampling: Sampling,
    /// Limit the scaled radius to the hemisphere (`r * zoom <= 1`).
    pub clamp_hemisphere: bool,
}

impl Default for ProjectionParameters {
    fn default() -> Self {
        ProjectionParameters {
            rotation_degrees: 0.0,
            zoom_factor: 1.0,
            tilt_degrees: 0.0,
            pan_degrees: 0.0,
            roll_degrees: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
            sampling: Sampling::Nearest,
            clamp_hemisphere: false,
        }
    }
}

impl ProjectionParameters {
    pub fn validate(&self) -> Result<()> {
        let angles = [
            ("rotation", self.rotation_degrees),
            ("tilt", self.tilt_degrees),
            ("pan", self.pan_degrees),
            ("roll", self.roll_degrees),
        ];
        for (name, value) in angles {
            if !value.is_finite() {
                return Err(Error::invalid(format!("{name} angle must be finite, got {value}")));
            }
        }
        if !self.zoom_factor.is_finite() || self.zoom_factor <= 0.0 {
            return Err(Error::invalid(format!(
                "zoom factor must be positive, got {}",
                self.zoom_factor
            )));
        }
        Ok(())
    }

    pub fn has_flip(&self) -> bool {
        self.flip_horizontal || self.flip_vertical
    }
}

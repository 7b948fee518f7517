use std::f64::consts::{PI, TAU};

use nalgebra::{vector, Rotation3, SVector, Vector3};

use crate::params::ProjectionParameters;

type Vec2u = SVector<usize, 2>;
type Vec2f = SVector<f64, 2>;
type Vec3f = SVector<f64, 3>;

/// Tilt (X), pan (Y) and roll (Z) kept as separate axis rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    tilt: Rotation3<f64>,
    pan: Rotation3<f64>,
    roll: Rotation3<f64>,
}

impl Orientation {
    pub fn from_degrees(tilt: f64, pan: f64, roll: f64) -> Self {
        Orientation {
            tilt: Rotation3::from_axis_angle(&Vector3::x_axis(), tilt.to_radians()),
            pan: Rotation3::from_axis_angle(&Vector3::y_axis(), pan.to_radians()),
            roll: Rotation3::from_axis_angle(&Vector3::z_axis(), roll.to_radians()),
        }
    }

    /// Rotates by tilt, then pan, then roll. Other orders give other images.
    pub fn apply(&self, p: Vec3f) -> Vec3f {
        let p = self.tilt * p;
        let p = self.pan * p;
        self.roll * p
    }
}

/// Maps pixels of a square fisheye canvas back onto an equirectangular source.
#[derive(Debug, Clone)]
pub struct FisheyeProjection {
    image_size: Vec2f,
    dome_size: usize,
    center: usize,
    in_plane: f64,
    zoom: f64,
    clamp_hemisphere: bool,
    orientation: Orientation,
}

impl FisheyeProjection {
    /// `image_size` is the source `[width, height]`; the canvas is
    /// `dome_size` pixels square.
    pub fn new(image_size: Vec2u, dome_size: usize, params: &ProjectionParameters) -> Self {
        FisheyeProjection {
            image_size: image_size.cast(),
            dome_size,
            center: dome_size / 2,
            in_plane: -params.rotation_degrees.to_radians(),
            zoom: params.zoom_factor,
            clamp_hemisphere: params.clamp_hemisphere,
            orientation: Orientation::from_degrees(
                params.tilt_degrees,
                params.pan_degrees,
                params.roll_degrees,
            ),
        }
    }

    pub fn dome_size(&self) -> usize {
        self.dome_size
    }

    /// Normalized radius and angle of canvas pixel `(x, y)`. The radius is 1
    /// at `center` pixels from the center.
    pub fn disc_coords(&self, x: usize, y: usize) -> (f64, f64) {
        let c = self.center as f64;
        let dx = (x as f64 - c) / c;
        let dy = (y as f64 - c) / c;
        ((dx * dx + dy * dy).sqrt(), dy.atan2(dx))
    }

    /// Source position sampled by canvas pixel `(x, y)`, or `None` when the
    /// pixel lies outside the dome circle.
    ///
    /// The returned column is in `[0, width]`, where `width` is the same
    /// meridian as column 0; the row is clamped to `[0, height - 1]`.
    pub fn source_coords(&self, x: usize, y: usize) -> Option<Vec2f> {
        let (r, theta) = self.disc_coords(x, y);
        if r > 1.0 {
            return None;
        }
        let mut r = r * self.zoom;
        if self.clamp_hemisphere {
            r = r.min(1.0);
        }
        let p = self.disc_to_sphere(r, theta + self.in_plane);
        let p = self.orientation.apply(p);
        Some(self.sphere_to_image(p))
    }

    /// Equidistant fisheye: the radius grows linearly with the angle from the
    /// view axis, reaching the horizon at `r = 1`.
    fn disc_to_sphere(&self, r: f64, theta: f64) -> Vec3f {
        let phi = r * 0.5 * PI;
        vector![phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos()]
    }

    fn sphere_to_image(&self, p: Vec3f) -> Vec2f {
        // Rotations can push |z| a hair past 1.
        let phi = p.z.clamp(-1.0, 1.0).acos();
        let theta = p.y.atan2(p.x);
        let (width, height) = (self.image_size.x, self.image_size.y);
        let col = ((theta + PI) / TAU * width).rem_euclid(width);
        let row = (phi / PI * height).clamp(0.0, height - 1.0);
        vector![col, row]
    }
}

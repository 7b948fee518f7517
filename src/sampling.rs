//! Pixel fetch at fractional source coordinates.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::raster::Raster;

type Vec3u8 = SVector<u8, 3>;
type Vec3f = SVector<f64, 3>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Sampling {
    /// Truncate to the containing pixel. Reproduces the reference output
    /// exactly, aliasing included.
    #[default]
    Nearest,
    /// Blend the four surrounding pixels, wrapping across the panorama seam.
    Bilinear,
}

/// Fetches the color at `(x, y)`.
///
/// `x` is expected in `[0, width]` (the right edge is the same meridian as
/// column 0) and `y` in `[0, height - 1]`.
pub fn sample(raster: &Raster, x: f64, y: f64, sampling: Sampling) -> [u8; 3] {
    match sampling {
        Sampling::Nearest => nearest(raster, x, y),
        Sampling::Bilinear => bilinear(raster, x, y),
    }
}

fn nearest(raster: &Raster, x: f64, y: f64) -> [u8; 3] {
    let col = (x.max(0.0) as usize) % raster.width();
    let row = (y.max(0.0) as usize).min(raster.height() - 1);
    raster.pixel(col, row)
}

fn fetch(raster: &Raster, col: usize, row: usize) -> Vec3f {
    Vec3u8::from(raster.pixel(col, row)).cast::<f64>()
}

fn interpolation(q1: Vec3f, q2: Vec3f, t: f64) -> Vec3f {
    q1.scale(1.0 - t) + q2.scale(t)
}

fn bilinear(raster: &Raster, x: f64, y: f64) -> [u8; 3] {
    let (width, height) = (raster.width(), raster.height());
    let x = x.max(0.0);
    let y = y.max(0.0);

    let col1 = (x as usize) % width;
    let col2 = (col1 + 1) % width;
    let row1 = (y as usize).min(height - 1);
    let row2 = (row1 + 1).min(height - 1);
    let tx = x.fract();
    let ty = if y as usize >= height - 1 { 0.0 } else { y.fract() };

    let r1 = interpolation(fetch(raster, col1, row1), fetch(raster, col2, row1), tx);
    let r2 = interpolation(fetch(raster, col1, row2), fetch(raster, col2, row2), tx);
    let q = interpolation(r1, r2, ty);
    [q[0].round() as u8, q[1].round() as u8, q[2].round() as u8]
}

//! Equirectangular panorama to fulldome fisheye remapping.

use std::borrow::Cow;

use log::debug;
use nalgebra::vector;
use ndarray::Axis;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::params::ProjectionParameters;
use crate::projection::FisheyeProjection;
use crate::raster::Raster;
use crate::sampling::sample;

/// Side of the square dome canvas produced from a `width × height` source.
pub fn dome_size(width: usize, height: usize) -> usize {
    width.min(height)
}

/// Projects `source` onto a circular dome canvas.
///
/// Flips are applied to the source before anything else. Canvas pixels
/// outside the dome circle stay black. The result has the same channel order
/// as `source`.
pub fn remap(source: &Raster, params: &ProjectionParameters) -> Result<Raster> {
    params.validate()?;
    if source.is_empty() {
        return Err(Error::invalid("source raster is empty"));
    }
    let dome = dome_size(source.width(), source.height());
    if dome < 2 {
        return Err(Error::invalid(format!(
            "source {}x{} is too small, both sides need at least 2 pixels",
            source.width(),
            source.height()
        )));
    }

    let source: Cow<'_, Raster> = if params.has_flip() {
        Cow::Owned(source.flipped(params.flip_horizontal, params.flip_vertical))
    } else {
        Cow::Borrowed(source)
    };
    let source: &Raster = &source;

    debug!(
        "remapping {}x{} source onto {dome}x{dome} dome",
        source.width(),
        source.height()
    );

    let projection = FisheyeProjection::new(vector![source.width(), source.height()], dome, params);
    let mut canvas = Raster::new(dome, dome, source.order());
    canvas
        .pixels_mut()
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(y, mut row)| {
            for x in 0..dome {
                if let Some(p) = projection.source_coords(x, y) {
                    let color = sample(source, p.x, p.y, params.sampling);
                    for (c, value) in color.into_iter().enumerate() {
                        row[[x, c]] = value;
                    }
                }
            }
        });
    Ok(canvas)
}

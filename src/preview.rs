//! Reduced-size rendering for interactive display.

use log::debug;

use crate::error::Result;
use crate::params::ProjectionParameters;
use crate::raster::{ChannelOrder, Raster};
use crate::remap::remap;

/// Longest side, in pixels, of the source fed to the preview remap.
pub const PREVIEW_MAX_SIDE: usize = 600;

/// Renders a dome preview of `source` in RGB order.
///
/// The source is flipped, scaled up or down so its longest side is
/// `max_side`, then remapped with the same kernel the exports use.
pub fn render_preview(
    source: &Raster,
    params: &ProjectionParameters,
    max_side: usize,
) -> Result<Raster> {
    params.validate()?;
    let flipped = source.flipped(params.flip_horizontal, params.flip_vertical);
    let scaled = flipped.resized_to_longest_side(max_side)?;
    debug!(
        "preview source {}x{} -> {}x{}",
        source.width(),
        source.height(),
        scaled.width(),
        scaled.height()
    );

    let params = ProjectionParameters {
        flip_horizontal: false,
        flip_vertical: false,
        ..*params
    };
    let dome = remap(&scaled, &params)?;
    Ok(dome.with_order(ChannelOrder::Rgb))
}

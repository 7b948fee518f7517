//! Conversion of equirectangular 360° panoramas into circular fulldome
//! (fisheye) images and videos for planetarium projection.
//!
//! [`remap`] is the core: a pure function from a source [`Raster`] and a set
//! of [`ProjectionParameters`] to a square dome canvas. [`convert`] and
//! [`pipeline`] drive it over image files and video streams.

pub mod config;
pub mod convert;
pub mod error;
pub mod image_io;
pub mod params;
pub mod pipeline;
pub mod preview;
pub mod projection;
pub mod raster;
pub mod remap;
pub mod sampling;
pub mod video;

pub use crate::config::{Config, OutputOptions};
pub use crate::convert::{convert, default_output_path, MediaKind};
pub use crate::error::{Error, Result};
pub use crate::params::ProjectionParameters;
pub use crate::pipeline::{
    CancelToken, FrameSink, FrameSource, PipelineOptions, PipelineStats, ProgressSink,
};
pub use crate::preview::{render_preview, PREVIEW_MAX_SIDE};
pub use crate::raster::{ChannelOrder, Raster};
pub use crate::remap::{dome_size, remap};
pub use crate::sampling::Sampling;

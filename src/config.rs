//! JSON presets bundling every setting of a conversion job.
//!
//! Every section and field is optional in the file; anything missing takes
//! its default, so a preset can be as small as `{"projection": {"tilt_degrees": 20}}`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image_io::DEFAULT_JPEG_QUALITY;
use crate::params::ProjectionParameters;
use crate::pipeline::PipelineOptions;
use crate::video::FfmpegOptions;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub projection: ProjectionParameters,
    pub pipeline: PipelineOptions,
    pub output: OutputOptions,
    pub ffmpeg: FfmpegOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Quality of JPEG stills, 1-100.
    pub jpeg_quality: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("failed to read {}", path.display()), e))?;
        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text + "\n")
            .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))
    }
}

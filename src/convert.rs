//! Whole-file conversion jobs: one still image or one video.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::image_io::{load_image, save_image};
use crate::params::ProjectionParameters;
use crate::pipeline::{self, CancelToken, PipelineStats, ProgressSink};
use crate::raster::ChannelOrder;
use crate::remap::{dome_size, remap};
use crate::video::{FfmpegSink, FfmpegSource};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "m4v"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classifies a file by its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Ok(MediaKind::Video)
        } else {
            Err(Error::invalid(format!(
                "unsupported file type: {}",
                path.display()
            )))
        }
    }

    pub fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// `<dir>/<stem>_fulldome.<jpg|mp4>` next to `input`.
pub fn default_output_path(input: &Path, kind: MediaKind) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_fulldome.{}", kind.default_extension()))
}

pub fn convert_image<P>(
    input: &Path,
    output: &Path,
    params: &ProjectionParameters,
    jpeg_quality: u8,
    progress: &mut P,
) -> Result<()>
where
    P: ProgressSink + ?Sized,
{
    let source = load_image(input)?;
    let dome = remap(&source, params)?;
    save_image(&dome, output, jpeg_quality)?;
    progress.report(100);
    Ok(())
}

pub fn convert_video<P>(
    input: &Path,
    output: &Path,
    config: &Config,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<PipelineStats>
where
    P: ProgressSink + ?Sized,
{
    config.projection.validate()?;
    let mut source = FfmpegSource::open(input, &config.ffmpeg, config.pipeline.strict_frames)?;
    let video = *source.info();
    let dome = dome_size(video.width, video.height);
    if dome < 2 {
        return Err(Error::invalid(format!(
            "video {}x{} is too small for a dome",
            video.width, video.height
        )));
    }

    let mut sink = FfmpegSink::create(
        output,
        dome,
        dome,
        video.fps,
        ChannelOrder::Rgb,
        &config.ffmpeg,
    )?;
    info!(
        "converting {} -> {} ({dome}x{dome} at {:.3} fps)",
        input.display(),
        output.display(),
        video.fps
    );
    pipeline::run(
        &mut source,
        &mut sink,
        &config.projection,
        &config.pipeline,
        progress,
        cancel,
    )
}

/// Converts `input` to `output`, choosing the still or video path from the
/// input extension.
pub fn convert<P>(
    input: &Path,
    output: &Path,
    config: &Config,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<()>
where
    P: ProgressSink + ?Sized,
{
    let kind = MediaKind::from_path(input)?;
    if let Ok(output_kind) = MediaKind::from_path(output) {
        if output_kind != kind {
            return Err(Error::invalid(format!(
                "cannot write {:?} input {} as {}",
                kind,
                input.display(),
                output.display()
            )));
        }
    }

    match kind {
        MediaKind::Image => convert_image(
            input,
            output,
            &config.projection,
            config.output.jpeg_quality,
            progress,
        ),
        MediaKind::Video => {
            let stats = convert_video(input, output, config, progress, cancel)?;
            if stats.cancelled {
                warn!(
                    "{} holds only the first {} frames",
                    output.display(),
                    stats.frames_written
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_io::DEFAULT_JPEG_QUALITY;
    use crate::raster::Raster;
    use tempfile::TempDir;

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a/pano.JPG")).unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::from_path(Path::new("pano.png")).unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::from_path(Path::new("clip.mp4")).unwrap(), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("clip.AVI")).unwrap(), MediaKind::Video);
        assert!(MediaKind::from_path(Path::new("notes.txt")).is_err());
        assert!(MediaKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/data/pano.png"), MediaKind::Image),
            PathBuf::from("/data/pano_fulldome.jpg")
        );
        assert_eq!(
            default_output_path(Path::new("clip.avi"), MediaKind::Video),
            PathBuf::from("clip_fulldome.mp4")
        );
    }

    #[test_log::test]
    fn test_convert_image_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("pano.png");
        let output = temp_dir.path().join("dome.png");
        let source = Raster::from_fn(64, 32, ChannelOrder::Rgb, |x, y| [x as u8 * 4, y as u8 * 8, 99]);
        save_image(&source, &input, DEFAULT_JPEG_QUALITY).unwrap();

        let mut reports = Vec::new();
        let mut progress = |p: u8| reports.push(p);
        convert(&input, &output, &Config::default(), &mut progress, &CancelToken::new()).unwrap();

        assert_eq!(reports, vec![100]);
        let dome = load_image(&output).unwrap();
        assert_eq!(dome, remap(&source, &ProjectionParameters::default()).unwrap());
    }

    #[test]
    fn test_convert_rejects_kind_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("pano.png");
        let err = convert(
            &input,
            &temp_dir.path().join("dome.mp4"),
            &Config::default(),
            &mut |_: u8| {},
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_convert_missing_image_reports_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut reports = Vec::new();
        let mut progress = |p: u8| reports.push(p);
        let err = convert(
            &temp_dir.path().join("missing.jpg"),
            &temp_dir.path().join("dome.jpg"),
            &Config::default(),
            &mut progress,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(reports.is_empty());
    }
}

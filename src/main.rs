use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::info;

use fulldome::params::{MAX_ANGLE, MAX_ZOOM, MIN_ZOOM};
use fulldome::{convert, default_output_path, CancelToken, Config, MediaKind, Sampling};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert equirectangular panoramas and videos to fulldome fisheye projection"
)]
struct Args {
    /// Input image (jpg, png, ...) or video (mp4, avi, ...)
    input: PathBuf,

    /// Output file, defaults to <input>_fulldome.jpg or <input>_fulldome.mp4
    output: Option<PathBuf>,

    /// JSON preset; flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this JSON file before converting
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Rotation around the X axis in degrees (-180 to 180)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_angle)]
    tilt: Option<f64>,

    /// Rotation around the Y axis in degrees (-180 to 180)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_angle)]
    pan: Option<f64>,

    /// Rotation around the Z axis in degrees (-180 to 180)
    #[arg(long, allow_hyphen_values = true, value_parser = parse_angle)]
    roll: Option<f64>,

    /// In-plane rotation of the dome image in degrees
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<f64>,

    /// Field of view factor (0.1 to 2.0), larger values zoom out
    #[arg(long, value_parser = parse_zoom)]
    zoom: Option<f64>,

    /// Mirror the source left to right before converting
    #[arg(long)]
    flip_h: bool,

    /// Mirror the source top to bottom before converting
    #[arg(long)]
    flip_v: bool,

    /// Source sampling filter
    #[arg(long, value_enum)]
    sampling: Option<Sampling>,

    /// Never look past the dome horizon, whatever the zoom
    #[arg(long)]
    clamp_hemisphere: bool,

    /// Video frames remapped in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Frames buffered between decoding, remapping and encoding
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Fail on a truncated video frame instead of ending the video there
    #[arg(long)]
    strict_frames: bool,

    /// JPEG quality for still output (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,
}

fn parse_angle(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("invalid angle: {s}"))?;
    if !(-MAX_ANGLE..=MAX_ANGLE).contains(&value) {
        return Err(format!("angle must be within ±{MAX_ANGLE} degrees"));
    }
    Ok(value)
}

fn parse_zoom(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("invalid zoom: {s}"))?;
    if !(MIN_ZOOM..=MAX_ZOOM).contains(&value) {
        return Err(format!("zoom must be between {MIN_ZOOM} and {MAX_ZOOM}"));
    }
    Ok(value)
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        let projection = &mut config.projection;
        if let Some(tilt) = self.tilt {
            projection.tilt_degrees = tilt;
        }
        if let Some(pan) = self.pan {
            projection.pan_degrees = pan;
        }
        if let Some(roll) = self.roll {
            projection.roll_degrees = roll;
        }
        if let Some(rotation) = self.rotation {
            projection.rotation_degrees = rotation;
        }
        if let Some(zoom) = self.zoom {
            projection.zoom_factor = zoom;
        }
        if let Some(sampling) = self.sampling {
            projection.sampling = sampling;
        }
        projection.flip_horizontal |= self.flip_h;
        projection.flip_vertical |= self.flip_v;
        projection.clamp_hemisphere |= self.clamp_hemisphere;

        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(depth) = self.queue_depth {
            config.pipeline.queue_depth = depth;
        }
        config.pipeline.strict_frames |= self.strict_frames;
        if let Some(quality) = self.quality {
            config.output.jpeg_quality = quality;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load preset {}", path.display()))?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config
        .projection
        .validate()
        .context("Invalid projection parameters")?;

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save preset {}", path.display()))?;
        info!("Settings saved to {}", path.display());
    }

    let kind = MediaKind::from_path(&args.input)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, kind));
    info!("Converting {} -> {}", args.input.display(), output.display());

    let mut last_percent = None;
    let mut progress = |percent: u8| {
        if last_percent != Some(percent) {
            info!("Progress: {percent}%");
            last_percent = Some(percent);
        }
    };

    let started = Instant::now();
    convert(&args.input, &output, &config, &mut progress, &CancelToken::new())
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;
    info!(
        "Finished {} in {:.1}s",
        output.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_angles_parse() {
        let args = Args::try_parse_from(["fulldome", "pano.jpg", "--tilt", "-45", "--pan=-180"]).unwrap();
        assert_eq!(args.tilt, Some(-45.0));
        assert_eq!(args.pan, Some(-180.0));
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        assert!(Args::try_parse_from(["fulldome", "pano.jpg", "--roll", "181"]).is_err());
        assert!(Args::try_parse_from(["fulldome", "pano.jpg", "--zoom", "0"]).is_err());
        assert!(Args::try_parse_from(["fulldome", "pano.jpg", "--zoom", "2.5"]).is_err());
        assert!(Args::try_parse_from(["fulldome", "pano.jpg", "--quality", "0"]).is_err());
    }

    #[test]
    fn test_flags_override_preset() {
        let args = Args::try_parse_from([
            "fulldome",
            "clip.mp4",
            "out.mp4",
            "--zoom",
            "1.5",
            "--flip-v",
            "--sampling",
            "bilinear",
            "--workers",
            "2",
        ])
        .unwrap();
        let mut config = Config::default();
        config.projection.tilt_degrees = 10.0;
        args.apply_to(&mut config);

        assert_eq!(config.projection.tilt_degrees, 10.0);
        assert_eq!(config.projection.zoom_factor, 1.5);
        assert!(config.projection.flip_vertical);
        assert!(!config.projection.flip_horizontal);
        assert_eq!(config.projection.sampling, Sampling::Bilinear);
        assert_eq!(config.pipeline.workers, 2);
    }
}

//! Still image decode and encode through the `image` crate.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat};
use log::info;

use crate::error::{Error, Result};
use crate::raster::Raster;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

pub fn load_image(path: &Path) -> Result<Raster> {
    let image = image::open(path).map_err(|e| read_error(e, path))?;
    info!(
        "loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Raster::from_rgb_image(image.to_rgb8())
}

/// Writes `raster` to `path`, choosing the format from the extension.
/// JPEG output is encoded at `jpeg_quality` (1-100).
pub fn save_image(raster: &Raster, path: &Path, jpeg_quality: u8) -> Result<()> {
    let image = raster.to_rgb_image()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("failed to create {}", parent.display()), e))?;
    }

    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => {
            let file = File::create(path)
                .map_err(|e| Error::io(format!("failed to create {}", path.display()), e))?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, jpeg_quality.clamp(1, 100))
                .encode_image(&image)
                .map_err(|e| write_error(e, path))?;
            writer
                .flush()
                .map_err(|e| Error::io(format!("failed to write {}", path.display()), e))?;
        }
        _ => image.save(path).map_err(|e| write_error(e, path))?,
    }
    info!("wrote {}", path.display());
    Ok(())
}

fn read_error(err: ImageError, path: &Path) -> Error {
    match err {
        ImageError::IoError(source) => {
            Error::io(format!("failed to read {}", path.display()), source)
        }
        other => Error::Decode(format!("{}: {other}", path.display())),
    }
}

fn write_error(err: ImageError, path: &Path) -> Error {
    match err {
        ImageError::IoError(source) => {
            Error::io(format!("failed to write {}", path.display()), source)
        }
        other => Error::Encode(format!("{}: {other}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ChannelOrder;
    use tempfile::TempDir;

    fn checker() -> Raster {
        Raster::from_fn(8, 4, ChannelOrder::Rgb, |x, y| {
            if (x + y) % 2 == 0 {
                [200, 10, 10]
            } else {
                [10, 10, 200]
            }
        })
    }

    #[test]
    fn test_png_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/out.png");
        save_image(&checker(), &path, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(load_image(&path).unwrap(), checker());
    }

    #[test]
    fn test_png_from_bgr_is_written_as_rgb() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bgr.png");
        let bgr = checker().with_order(ChannelOrder::Bgr);
        save_image(&bgr, &path, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(load_image(&path).unwrap(), checker());
    }

    #[test]
    fn test_jpeg_keeps_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jpg");
        save_image(&checker(), &path, 80).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!((loaded.width(), loaded.height()), (8, 4));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_jpeg_write_failure_is_reported() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("full.jpg");
        std::os::unix::fs::symlink(full, &path).unwrap();
        // The whole encoded image fits in the write buffer, so the device
        // only refuses it on the final flush.
        let err = save_image(&checker(), &path, 80).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = load_image(&temp_dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(load_image(&path), Err(Error::Decode(_))));
    }
}

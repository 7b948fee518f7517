//! Owned 8-bit, 3-channel pixel grids with an explicit channel order.

use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Order of the three samples stored for each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// A `height × width × 3` image.
///
/// The backing array is always kept in standard row-major layout so the raw
/// bytes can be handed to encoders without another copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: Array3<u8>,
    order: ChannelOrder,
}

impl Raster {
    /// Black raster of the given size.
    pub fn new(width: usize, height: usize, order: ChannelOrder) -> Self {
        Raster {
            pixels: Array3::zeros((height, width, 3)),
            order,
        }
    }

    pub fn from_array(pixels: Array3<u8>, order: ChannelOrder) -> Result<Self> {
        let (_, _, channels) = pixels.dim();
        if channels != 3 {
            return Err(Error::invalid(format!(
                "expected 3 channels per pixel, got {channels}"
            )));
        }
        let pixels = if pixels.is_standard_layout() {
            pixels
        } else {
            pixels.as_standard_layout().into_owned()
        };
        Ok(Raster { pixels, order })
    }

    pub fn from_raw(width: usize, height: usize, bytes: Vec<u8>, order: ChannelOrder) -> Result<Self> {
        let len = bytes.len();
        let pixels = Array3::from_shape_vec((height, width, 3), bytes).map_err(|_| {
            Error::invalid(format!(
                "{len} bytes do not describe a {width}x{height} 3-channel raster"
            ))
        })?;
        Ok(Raster { pixels, order })
    }

    /// Builds a raster by evaluating `f(x, y)` for every pixel.
    pub fn from_fn<F>(width: usize, height: usize, order: ChannelOrder, f: F) -> Self
    where
        F: Fn(usize, usize) -> [u8; 3],
    {
        let pixels = Array3::from_shape_fn((height, width, 3), |(y, x, c)| f(x, y)[c]);
        Raster { pixels, order }
    }

    pub fn from_rgb_image(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(
            width as usize,
            height as usize,
            image.into_raw(),
            ChannelOrder::Rgb,
        )
    }

    /// Converts to an `image` buffer, swapping channels if stored as BGR.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        self.with_order(ChannelOrder::Rgb).into_image_buffer()
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Samples at column `x`, row `y` in storage order.
    ///
    /// # Panics
    /// Panics if the coordinate lies outside the raster.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        [
            self.pixels[[y, x, 0]],
            self.pixels[[y, x, 1]],
            self.pixels[[y, x, 2]],
        ]
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut Array3<u8> {
        &mut self.pixels
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Every constructor stores a standard-layout array.
        self.pixels.as_slice().unwrap_or(&[])
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pixels.into_raw_vec()
    }

    /// Mirrored copy: `horizontal` reverses columns, `vertical` reverses rows.
    pub fn flipped(&self, horizontal: bool, vertical: bool) -> Raster {
        let view = match (horizontal, vertical) {
            (false, false) => self.pixels.view(),
            (true, false) => self.pixels.slice(s![.., ..;-1, ..]),
            (false, true) => self.pixels.slice(s![..;-1, .., ..]),
            (true, true) => self.pixels.slice(s![..;-1, ..;-1, ..]),
        };
        Raster {
            pixels: view.as_standard_layout().into_owned(),
            order: self.order,
        }
    }

    /// Same pixels re-expressed in `order`.
    pub fn with_order(&self, order: ChannelOrder) -> Raster {
        if order == self.order {
            return self.clone();
        }
        let swapped = self.pixels.slice(s![.., .., ..;-1]);
        Raster {
            pixels: swapped.as_standard_layout().into_owned(),
            order,
        }
    }

    /// Rescales, keeping the aspect ratio, so the longest side is `side`
    /// pixels. Shorter sides are truncated to whole pixels, never below 1.
    pub fn resized_to_longest_side(&self, side: usize) -> Result<Raster> {
        let longest = self.width().max(self.height());
        if longest == side || self.is_empty() {
            return Ok(self.clone());
        }
        if side == 0 {
            return Err(Error::invalid("cannot resize to a zero-sized raster"));
        }
        let scale = side as f64 / longest as f64;
        let width = ((self.width() as f64 * scale) as u32).max(1);
        let height = ((self.height() as f64 * scale) as u32).max(1);

        // Resampling does not care about channel order, so the bytes go
        // through as stored.
        let buffer = self.clone().into_image_buffer()?;
        let resized = imageops::resize(&buffer, width, height, FilterType::Triangle);
        Self::from_raw(
            width as usize,
            height as usize,
            resized.into_raw(),
            self.order,
        )
    }

    fn into_image_buffer(self) -> Result<RgbImage> {
        let (width, height) = (self.width() as u32, self.height() as u32);
        RgbImage::from_raw(width, height, self.into_bytes())
            .ok_or_else(|| Error::invalid("pixel buffer smaller than its dimensions"))
    }
}

use ndarray::{Array2, Array3};
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Channel order of a color raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

/// A convinence struct that holds a color image, a depth image and its depth scale.
/// Both rasters are registered pixel by pixel.
#[derive(Clone, Debug)]
pub struct RgbdImage {
    /// Color raster, shape is (height, width, 3).
    pub color: Array3<u8>,
    /// Depth raster in sensor units, shape is (height, width).
    pub depth: Array2<u16>,
    /// Multiplier that converts depth units into meters.
    pub depth_scale: f64,
    /// Channel order of `color`.
    pub color_order: ColorOrder,
}

impl RgbdImage {
    /// Creates an RGB-D image with millimeter depth and RGB colors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] if the rasters don't share width and height or
    /// if the color raster doesn't have 3 channels.
    pub fn new(color: Array3<u8>, depth: Array2<u16>) -> Result<Self> {
        let (color_height, color_width, channels) = color.dim();
        let (depth_height, depth_width) = depth.dim();

        if channels != 3 {
            return Err(Error::input(format!(
                "Color raster must have 3 channels, got {channels}"
            )));
        }
        if (color_height, color_width) != (depth_height, depth_width) {
            return Err(Error::input(format!(
                "Color raster is {color_width}x{color_height} but depth raster is {depth_width}x{depth_height}"
            )));
        }

        Ok(Self {
            color,
            depth,
            depth_scale: 1.0 / 1000.0,
            color_order: ColorOrder::Rgb,
        })
    }

    /// Declares the channel order of the color raster, e.g. [`ColorOrder::Bgr`]
    /// for images that were decoded into blue-green-red layout.
    pub fn with_color_order(mut self, color_order: ColorOrder) -> Self {
        self.color_order = color_order;
        self
    }

    pub fn width(&self) -> usize {
        self.depth.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.depth.shape()[0]
    }

    /// Color of a pixel in red, green, blue order regardless of the raster's channel order.
    pub fn rgb(&self, row: usize, col: usize) -> [u8; 3] {
        let c0 = self.color[[row, col, 0]];
        let c1 = self.color[[row, col, 1]];
        let c2 = self.color[[row, col, 2]];
        match self.color_order {
            ColorOrder::Rgb => [c0, c1, c2],
            ColorOrder::Bgr => [c2, c1, c0],
        }
    }
}

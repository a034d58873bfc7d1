use anyhow::{anyhow, Result};
use ndarray::{Array3, Array4, ArrayView3, Axis};

/// 8-bit RGB image stored as `[height, width, 3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbImage {
    pub pixels: Array3<u8>,
}

impl RgbImage {
    /// From a `[3, height, width]` tensor in `[0, 1]`; values outside are clipped.
    pub fn from_chw(image: &ArrayView3<f32>) -> Result<Self> {
        if image.shape()[0] != 3 {
            return Err(anyhow!(
                "expected 3 channels, got image of shape {:?}",
                image.shape()
            ));
        }
        let hwc = image.view().permuted_axes([1, 2, 0]);
        Ok(Self {
            pixels: hwc.mapv(|x| (255.0 * x.clamp(0.0, 1.0)) as u8),
        })
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn pixel(&self, y: usize, x: usize) -> [u8; 3] {
        [self.pixels[[y, x, 0]], self.pixels[[y, x, 1]], self.pixels[[y, x, 2]]]
    }
}

/// Splits a `[batch, 3, height, width]` codec output into images.
pub fn to_rgb_images(images: &Array4<f32>) -> Result<Vec<RgbImage>> {
    images
        .axis_iter(Axis(0))
        .map(|image| RgbImage::from_chw(&image))
        .collect()
}

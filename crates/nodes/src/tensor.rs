//! Encoded image ↔ float tensor conversion
//!
//! The pipeline host hands images around as `[H, W, 3]` float tensors in
//! the 0..=1 range. The relay speaks encoded PNG bytes. These helpers
//! translate between the two; alpha is dropped on the way in.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::NodeError;

/// Edge length of the blank placeholder frame.
pub const PLACEHOLDER_SIZE: u32 = 1024;

/// An `[H, W, 3]` float image in the 0..=1 range, row-major, channels
/// interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl ImageTensor {
    /// Decode any supported image format into a tensor.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, NodeError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| NodeError::Decode(err.to_string()))?;
        Ok(Self::from_rgb(&decoded.to_rgb8()))
    }

    /// Convert an 8-bit RGB image into a tensor.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let data = img.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
        Self {
            data,
            width: img.width(),
            height: img.height(),
        }
    }

    /// A uniform white frame, used when the pipeline must run before any
    /// canvas has been submitted.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            data: vec![1.0; (width * height * 3) as usize],
            width,
            height,
        }
    }

    /// The fixed-size placeholder the producer falls back to.
    pub fn placeholder() -> Self {
        Self::blank(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Convert back to an 8-bit RGB image, clamping values into 0..=1.
    pub fn to_rgb_image(&self) -> RgbImage {
        let pixels = self
            .data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        // Dimensions always match: data length is width * height * 3 by
        // construction.
        RgbImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Encode as PNG for the trip back through the relay.
    pub fn encode_png(&self) -> Result<Vec<u8>, NodeError> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.to_rgb_image())
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|err| NodeError::Encode(err.to_string()))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_rgb_tensor_roundtrip_is_lossless() {
        let img = gradient_image(32, 16);
        let tensor = ImageTensor::from_rgb(&img);
        assert_eq!(tensor.width(), 32);
        assert_eq!(tensor.height(), 16);
        assert_eq!(tensor.to_rgb_image(), img);
    }

    #[test]
    fn test_png_roundtrip() {
        let img = gradient_image(8, 8);
        let tensor = ImageTensor::from_rgb(&img);
        let png = tensor.encode_png().unwrap();
        let decoded = ImageTensor::from_encoded(&png).unwrap();
        assert_eq!(decoded, tensor);
    }

    #[test]
    fn test_placeholder_is_white() {
        let tensor = ImageTensor::placeholder();
        assert_eq!(tensor.width(), PLACEHOLDER_SIZE);
        assert_eq!(tensor.height(), PLACEHOLDER_SIZE);
        assert!(tensor.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_out_of_range_values_clamped_on_encode() {
        let tensor = ImageTensor {
            data: vec![-0.5, 2.0, 0.5],
            width: 1,
            height: 1,
        };
        let img = tensor.to_rgb_image();
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 255, 128]));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            ImageTensor::from_encoded(b"definitely not an image"),
            Err(NodeError::Decode(_))
        ));
    }
}

//! Tensor pre/post-processing for segmentation-model removers
//!
//! Letterboxes an image into the square NCHW input of a segmentation model,
//! maps the model's mask back onto the original pixel grid and applies it as
//! an alpha channel.

use crate::error::{BgtifyError, Result};
use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage};
use ndarray::Array4;

/// Input geometry and normalization of a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationInput {
    /// Side length of the square model input
    pub target_size: u32,
    /// Per-channel mean, in 0-1 units
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation, in 0-1 units
    pub normalization_std: [f32; 3],
    /// Letterbox padding colour
    pub padding_color: [u8; 3],
}

impl Default for SegmentationInput {
    fn default() -> Self {
        // ISNet: (x - 128) / 256 on 0-255 values
        Self {
            target_size: 1024,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            padding_color: [255, 255, 255],
        }
    }
}

/// Placement of the scaled image inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    offset_x: u32,
    offset_y: u32,
    scaled_width: u32,
    scaled_height: u32,
}

impl Letterbox {
    fn fit(original: (u32, u32), target_size: u32) -> Result<Self> {
        if target_size == 0 {
            return Err(BgtifyError::removal("Model input size must be non-zero"));
        }
        let (width, height) = original;
        if width == 0 || height == 0 {
            return Err(BgtifyError::removal("Image has zero width or height"));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        })
    }
}

/// Build the normalized `1x3xSxS` input tensor for `image`
pub fn preprocess(image: &DynamicImage, input: &SegmentationInput) -> Result<Array4<f32>> {
    let rgb = image.to_rgb8();
    let letterbox = Letterbox::fit(rgb.dimensions(), input.target_size)?;

    let resized = image::imageops::resize(
        &rgb,
        letterbox.scaled_width,
        letterbox.scaled_height,
        image::imageops::FilterType::Triangle,
    );

    let [pr, pg, pb] = input.padding_color;
    let mut canvas = ImageBuffer::from_pixel(
        input.target_size,
        input.target_size,
        image::Rgb([pr, pg, pb]),
    );
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.offset_x),
        i64::from(letterbox.offset_y),
    );

    let size = input.target_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in canvas.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel.0.get(channel).copied().unwrap_or(0)) / 255.0;
            let mean = input.normalization_mean.get(channel).copied().unwrap_or(0.0);
            let std = input.normalization_std.get(channel).copied().unwrap_or(1.0);
            if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                *slot = (value - mean) / std;
            }
        }
    }

    Ok(tensor)
}

/// Map a `1x1xHxW` model output back onto the original image grid.
///
/// Returns one 0-255 alpha value per original pixel, row-major.
pub fn mask_from_output(output: &Array4<f32>, original: (u32, u32)) -> Result<Vec<u8>> {
    let shape = output.shape();
    let (channels, mask_height, mask_width) = match shape {
        [1, c, h, w] => (*c, *h, *w),
        _ => {
            return Err(BgtifyError::removal(format!(
                "Unexpected mask tensor shape {shape:?}"
            )))
        },
    };
    if channels != 1 || mask_width != mask_height {
        return Err(BgtifyError::removal(format!(
            "Unexpected mask tensor shape {shape:?}"
        )));
    }

    let letterbox = Letterbox::fit(original, mask_width as u32)?;
    let (width, height) = original;
    let mut mask = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height {
        for x in 0..width {
            let tx = (x as f32 * letterbox.scale).round() as u32 + letterbox.offset_x;
            let ty = (y as f32 * letterbox.scale).round() as u32 + letterbox.offset_y;
            let value = output
                .get([0, 0, ty as usize, tx as usize])
                .copied()
                .unwrap_or(0.0);
            mask.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }

    Ok(mask)
}

/// Apply a per-pixel alpha mask; fully transparent pixels are zeroed
#[must_use]
pub fn apply_mask(image: &DynamicImage, mask: &[u8]) -> RgbaImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut result = ImageBuffer::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let index = (y * width + x) as usize;
        let alpha = mask.get(index).copied().unwrap_or(0);
        let out = if alpha > 0 {
            Rgba([pixel[0], pixel[1], pixel[2], alpha])
        } else {
            Rgba([0, 0, 0, 0])
        };
        result.put_pixel(x, y, out);
    }

    result
}

/// Encode an RGBA image as PNG
pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| BgtifyError::removal(format!("Failed to encode result: {e}")))?;
    Ok(bytes)
}

use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use tracing::{debug, error, instrument};

use crate::{
    errors::{EnhanceError, Result},
    imageops::{denoise_colored, DenoiseParams},
};

/// Spatial downsampling factor of the network. Input sides must be multiples of it.
pub const STRIDE: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOptions {
    pub denoise: bool,
    pub denoise_after: bool,
}

/// Keep only the first three channels as 8-bit RGB.
///
/// Alpha is dropped rather than composited; gray images are replicated into RGB.
pub fn to_channels3(image: &DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    }
}

/// Largest multiple of [`STRIDE`] not exceeding `len`.
pub const fn stride_aligned(len: u32) -> u32 {
    len - len % STRIDE
}

/// Crop `height % 8` rows from the top and `width % 8` columns from the left.
pub fn crop_to_stride(image: &RgbImage) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let (aligned_width, aligned_height) = (stride_aligned(width), stride_aligned(height));
    if aligned_width == 0 || aligned_height == 0 {
        return Err(EnhanceError::Validation {
            field: "size".to_string(),
            reason: format!("{width}x{height} is smaller than the {STRIDE}px network stride"),
        });
    }
    if (aligned_width, aligned_height) == (width, height) {
        return Ok(image.clone());
    }

    Ok(imageops::crop_imm(
        image,
        width - aligned_width,
        height - aligned_height,
        aligned_width,
        aligned_height,
    )
    .to_image())
}

/// Resize to `(target_width, target_height)` and crop to the network stride.
///
/// Zero targets are clamped to 1; a target below the stride is rejected by the
/// crop step.
#[instrument(level = "info", skip(image))]
pub fn prepare_for_inference(
    image: &RgbImage,
    target_height: u32,
    target_width: u32,
) -> Result<RgbImage> {
    let target_height = target_height.max(1);
    let target_width = target_width.max(1);

    let resized = if image.dimensions() == (target_width, target_height) {
        image.clone()
    } else {
        imageops::resize(image, target_width, target_height, FilterType::Triangle)
    };
    crop_to_stride(&resized)
}

/// Non-local-means colour denoising with the tuned pre- or post-inference settings.
pub fn denoise(image: &RgbImage, before: bool) -> RgbImage {
    let params = if before {
        DenoiseParams::BEFORE_INFERENCE
    } else {
        DenoiseParams::AFTER_INFERENCE
    };
    denoise_colored(image, params)
}

/// Outcome of [`sample`]: always an image, plus the failure if there was one.
#[derive(Debug)]
pub struct Sampled {
    pub image: RgbImage,
    pub error: Option<EnhanceError>,
}

impl Sampled {
    pub fn into_result(self) -> Result<RgbImage> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.image),
        }
    }
}

/// Optional pre-denoise, one forward pass, optional post-denoise.
///
/// A failed forward pass yields a zero-filled image shaped like the input, with
/// the error carried next to it.
pub fn sample<F>(image: &RgbImage, options: SampleOptions, infer: F) -> Sampled
where
    F: FnOnce(&RgbImage) -> Result<RgbImage>,
{
    let input = if options.denoise {
        denoise(image, true)
    } else {
        image.clone()
    };

    match infer(&input) {
        Ok(output) => {
            debug!(
                input = ?input.dimensions(),
                output = ?output.dimensions(),
                "forward pass finished"
            );
            let image = if options.denoise_after {
                denoise(&output, false)
            } else {
                output
            };
            Sampled { image, error: None }
        }
        Err(err) => {
            error!(error = %err, "forward pass failed");
            Sampled {
                image: RgbImage::new(input.width(), input.height()),
                error: Some(err),
            }
        }
    }
}

use image::{ImageBuffer, Luma, RgbImage};

/// Scale at which the vignette has no visible effect.
pub const NO_EFFECT_SCALE: f32 = 2.0;

/// Scales at or above this are treated as [`NO_EFFECT_SCALE`].
pub const IDENTITY_THRESHOLD: f32 = 1.99;

const MIN_SCALE: f32 = 1e-3;

pub type Mask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Map a slider strength (0 = off) onto a vignette scale in `(0, 2]`.
pub fn scale_from_strength(strength: f32) -> f32 {
    (NO_EFFECT_SCALE - strength).clamp(MIN_SCALE, NO_EFFECT_SCALE)
}

/// Radial falloff mask `exp(-d² / σ²)` with `σ² = ((W/2)² + (H/2)²) / 2`.
///
/// `scale` zooms the mask about its centre: the mask is sampled over a window of
/// `1 / scale` times the image size and stretched back to the image size, so a
/// scale below 1 leaves a smaller bright centre and darker edges.
pub fn mask(width: u32, height: u32, scale: f32) -> Mask {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let sigma_squared = ((cx * cx + cy * cy) / 2.0).max(f32::EPSILON);
    let scale = scale.max(MIN_SCALE);

    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = (x as f32 - cx) / scale;
        let dy = (y as f32 - cy) / scale;
        Luma([(-(dx * dx + dy * dy) / sigma_squared).exp()])
    })
}

/// Darken the edges of `image`. Always returns a new buffer.
pub fn apply(image: &RgbImage, scale: f32) -> RgbImage {
    if scale >= IDENTITY_THRESHOLD {
        return image.clone();
    }

    let mask = mask(image.width(), image.height(), scale);
    let mut result = image.clone();
    for (pixel, Luma([weight])) in result.pixels_mut().zip(mask.pixels()) {
        for channel in pixel.0.iter_mut() {
            *channel = (f32::from(*channel) * weight).clamp(0.0, 255.0) as u8;
        }
    }
    result
}

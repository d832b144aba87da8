use image::{Rgb, RgbImage};

use crate::imageops::saturate_u8;

/// An RGB image split into full-range (JPEG) luma and chroma planes.
///
/// Luma and chroma are denoised with separate filter strengths, so the planes are
/// stored apart rather than interleaved.
#[derive(Debug, Clone)]
pub struct YCbCrPlanes {
    pub width: usize,
    pub height: usize,
    pub luma: Vec<f32>,
    pub cb: Vec<f32>,
    pub cr: Vec<f32>,
}

impl YCbCrPlanes {
    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let len = width as usize * height as usize;
        let mut luma = Vec::with_capacity(len);
        let mut cb = Vec::with_capacity(len);
        let mut cr = Vec::with_capacity(len);

        for Rgb([r, g, b]) in image.pixels() {
            let (r, g, b) = (f32::from(*r), f32::from(*g), f32::from(*b));
            luma.push(0.299 * r + 0.587 * g + 0.114 * b);
            cb.push(128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b);
            cr.push(128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b);
        }

        Self {
            width: width as usize,
            height: height as usize,
            luma,
            cb,
            cr,
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        let mut image = RgbImage::new(self.width as u32, self.height as u32);
        for (i, pixel) in image.pixels_mut().enumerate() {
            let y = self.luma[i];
            let cb = self.cb[i] - 128.0;
            let cr = self.cr[i] - 128.0;
            *pixel = Rgb([
                saturate_u8(y + 1.402 * cr),
                saturate_u8(y - 0.344_136 * cb - 0.714_136 * cr),
                saturate_u8(y + 1.772 * cb),
            ]);
        }
        image
    }
}

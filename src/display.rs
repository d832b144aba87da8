use std::time::Duration;

use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use tracing::debug;

/// Window resizes are folded into one preview rebuild per interval.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Largest size with the image's aspect ratio that fits the viewport.
pub fn fit_within(image: (u32, u32), viewport: (u32, u32)) -> (u32, u32) {
    let (width, height) = image;
    let (view_width, view_height) = viewport;
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = f64::min(
        f64::from(view_width) / f64::from(width),
        f64::from(view_height) / f64::from(height),
    );
    (
        ((f64::from(width) * scale) as u32).max(1),
        ((f64::from(height) * scale) as u32).max(1),
    )
}

/// RGBA pixels ready for the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// The display surface: the full-resolution displayed image plus a preview scaled
/// to the current viewport.
#[derive(Debug, Default)]
pub struct Canvas {
    image: Option<RgbImage>,
    viewport: Option<(u32, u32)>,
    pending_viewport: Option<(u32, u32)>,
    update_requested: bool,
    preview: Option<Preview>,
    revision: u64,
}

impl Canvas {
    /// Replace the displayed image and rebuild the preview right away.
    pub fn set_image(&mut self, image: RgbImage) {
        self.image = Some(image);
        self.rebuild();
    }

    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Bumped whenever the preview changes.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub const fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    /// Record a new viewport size; applied on the next [`Canvas::refresh`].
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending_viewport = Some((width.max(1), height.max(1)));
        self.update_requested = true;
    }

    pub fn request_update(&mut self) {
        self.update_requested = true;
    }

    /// Apply the latest requested viewport, if any. Returns whether anything changed.
    pub fn refresh(&mut self) -> bool {
        if !self.update_requested {
            return false;
        }
        self.update_requested = false;
        if let Some(viewport) = self.pending_viewport.take() {
            self.viewport = Some(viewport);
        }
        self.rebuild();
        true
    }

    fn rebuild(&mut self) {
        let Some(image) = &self.image else {
            self.preview = None;
            return;
        };

        let (width, height) = match self.viewport {
            Some(viewport) => fit_within(image.dimensions(), viewport),
            None => image.dimensions(),
        };
        let scaled = if (width, height) == image.dimensions() {
            image.clone()
        } else {
            imageops::resize(image, width, height, FilterType::Triangle)
        };

        self.preview = Some(Preview {
            width,
            height,
            rgba: DynamicImage::ImageRgb8(scaled).into_rgba8().into_raw(),
        });
        self.revision += 1;
        debug!(width, height, revision = self.revision, "canvas preview rebuilt");
    }
}

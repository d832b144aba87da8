use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::errors::Result;

/// A loaded enhancement graph.
///
/// Implementations run one forward pass per call and may return an image of a
/// different resolution than the input, as dictated by the graph's output tensor.
pub trait EnhancementModel: Send + Sync + std::fmt::Debug {
    /// Run a single forward pass over an 8-bit RGB image.
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage>;

    /// Human-readable model name, usually the file stem.
    fn name(&self) -> &str;
}

/// Turns a model file into a ready-to-run [`EnhancementModel`].
///
/// The controller loads models on a background thread through this seam, which
/// keeps the GUI logic testable without an ML runtime.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self, path: &Path) -> Result<Arc<dyn EnhancementModel>>;
}

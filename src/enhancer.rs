use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use crate::{
    errors::{EnhanceError, Result},
    job::JobSlot,
    model::OnnxLoader,
    traits::{EnhancementModel, ModelLoader},
};

/// Owns the currently loaded model.
///
/// A failed load never replaces the previous model. The adapter does no locking of
/// its own around inference; callers serialise work through [`Enhancer::slot`].
pub struct Enhancer<L: ModelLoader = OnnxLoader> {
    loader: Arc<L>,
    model: Option<Arc<dyn EnhancementModel>>,
    model_path: Option<PathBuf>,
    slot: JobSlot,
}

impl<L: ModelLoader> Enhancer<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            model: None,
            model_path: None,
            slot: JobSlot::new(),
        }
    }

    /// Load synchronously, keeping the previous model if this one fails.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        match self.loader.load(path) {
            Ok(model) => {
                self.install(model, Some(path.to_path_buf()));
                Ok(())
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "model load failed, keeping previous model");
                Err(err)
            }
        }
    }

    /// Swap in a model that was loaded elsewhere, e.g. on a background job.
    pub fn install(&mut self, model: Arc<dyn EnhancementModel>, path: Option<PathBuf>) {
        info!(name = model.name(), "model installed");
        self.model = Some(model);
        self.model_path = path;
    }

    pub fn infer(&self, image: &RgbImage) -> Result<RgbImage> {
        let model = self.model.as_ref().ok_or(EnhanceError::ModelNotLoaded)?;
        model.enhance(image)
    }

    /// True when a model is loaded and no job holds the model slot.
    pub fn available(&self) -> bool {
        self.is_loaded() && self.slot.is_idle()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn handle(&self) -> Option<Arc<dyn EnhancementModel>> {
        self.model.clone()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|model| model.name())
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn loader(&self) -> Arc<L> {
        Arc::clone(&self.loader)
    }

    pub const fn slot(&self) -> &JobSlot {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobKind;
    use crate::mocks::{MockBehaviour, MockLoader};
    use image::Rgb;

    #[test]
    fn test_infer_without_model() {
        let enhancer = Enhancer::new(MockLoader::new(MockBehaviour::Identity));
        let image = RgbImage::new(8, 8);
        assert!(matches!(
            enhancer.infer(&image),
            Err(EnhanceError::ModelNotLoaded)
        ));
        assert!(!enhancer.available());
    }

    #[test]
    fn test_failed_load_keeps_previous_model() -> Result<()> {
        let mut enhancer =
            Enhancer::new(MockLoader::new(MockBehaviour::Invert).with_broken("broken"));
        enhancer.load(Path::new("pretrained/iphone.onnx"))?;
        assert_eq!(enhancer.model_name(), Some("iphone"));

        let result = enhancer.load(Path::new("pretrained/broken.onnx"));
        assert!(matches!(result, Err(EnhanceError::Load { .. })));
        assert_eq!(enhancer.model_name(), Some("iphone"));

        let output = enhancer.infer(&RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])))?;
        assert_eq!(output.get_pixel(0, 0), &Rgb([255, 255, 255]));
        Ok(())
    }

    #[test]
    fn test_available_tracks_slot() -> Result<()> {
        let mut enhancer = Enhancer::new(MockLoader::new(MockBehaviour::Identity));
        enhancer.load(Path::new("model.onnx"))?;
        assert!(enhancer.available());

        let guard = enhancer.slot().try_acquire(JobKind::Enhance).unwrap();
        assert!(!enhancer.available());
        drop(guard);
        assert!(enhancer.available());
        Ok(())
    }
}

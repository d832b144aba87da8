//! Application state machine, independent of any widget toolkit.
//!
//! The controller owns an explicit [`AppState`]. Long-running work is started as a
//! [`JobHandle`] which the caller awaits off the UI thread and hands back through
//! `finish_*`. Only one job may hold the model at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    catalog::{self, ModelCatalog},
    display::Canvas,
    enhancer::Enhancer,
    errors::EnhanceError,
    imageops::vignette,
    job::{self, JobFailure, JobHandle, JobKind, JobResult, SlotGuard},
    model::OnnxLoader,
    pipeline::{self, SampleOptions},
    resize::{Dimension, ResizeFields},
    traits::{EnhancementModel, ModelLoader},
};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_ENHANCING: &str = "Enhancing...";
pub const STATUS_DONE: &str = "Done!";
pub const STATUS_FAILED: &str = "Enhancement failed";

/// How long a transient status stays up before reverting to [`STATUS_READY`].
pub const STATUS_RESET_AFTER: Duration = Duration::from_secs(3);

const NO_MODEL_LABEL: &str = "<none>";

/// A user-facing message for a rejected or failed operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    #[error("Open an image first.")]
    NoImage,

    #[error("Choose a model first.")]
    NoModel,

    #[error("Please wait, a {0} job is still running.")]
    Busy(JobKind),

    #[error("Model file {0:?} does not exist.")]
    ModelMissing(PathBuf),

    #[error("Could not load the model. {}", .0.message)]
    LoadFailed(JobFailure),

    #[error("Could not enhance the image. {}", .0.message)]
    EnhanceFailed(JobFailure),

    #[error("Could not open the image. {0}")]
    OpenFailed(String),

    #[error("Could not save the image. {0}")]
    SaveFailed(String),
}

impl Notice {
    pub const fn title(&self) -> &'static str {
        match self {
            Self::NoImage => "No image",
            Self::NoModel => "No model",
            Self::Busy(_) => "Busy",
            Self::ModelMissing(_) | Self::LoadFailed(_) => "Model load failed",
            Self::EnhanceFailed(_) => "Enhancement failed",
            Self::OpenFailed(_) => "Open failed",
            Self::SaveFailed(_) => "Save failed",
        }
    }

    /// Rejections are warnings; failures of started work are errors.
    pub const fn is_error(&self) -> bool {
        !matches!(self, Self::NoImage | Self::NoModel | Self::Busy(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ImageLoaded,
    ModelLoading,
    Inferring,
}

/// Where a model selection leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChoice {
    Resolved(PathBuf),
    PickFile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VignetteState {
    /// Slider position; 0 is no vignette.
    pub strength: f32,
    pub dirty: bool,
}

impl VignetteState {
    pub fn scale(&self) -> f32 {
        vignette::scale_from_strength(self.strength)
    }
}

/// Status bar text. The generation lets a delayed reset skip newer messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub generation: u64,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            text: STATUS_READY.to_string(),
            generation: 0,
        }
    }
}

#[derive(Debug)]
pub struct AppState {
    /// The image as opened, input of every enhancement.
    pub origin: Option<RgbImage>,
    /// Last enhanced (or opened) image before the vignette.
    pub clean: Option<RgbImage>,
    pub source: Option<PathBuf>,
    pub resize: ResizeFields,
    pub vignette: VignetteState,
    pub canvas: Canvas,
    pub status: Status,
    pub model_label: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            origin: None,
            clean: None,
            source: None,
            resize: ResizeFields::default(),
            vignette: VignetteState::default(),
            canvas: Canvas::default(),
            status: Status::default(),
            model_label: model_label(NO_MODEL_LABEL),
        }
    }
}

#[derive(Debug)]
struct PendingModel {
    path: PathBuf,
    previous_label: String,
}

pub struct Controller<L: ModelLoader = OnnxLoader> {
    catalog: ModelCatalog,
    enhancer: Enhancer<L>,
    sample_options: SampleOptions,
    state: AppState,
    in_flight: Option<SlotGuard>,
    pending_model: Option<PendingModel>,
}

impl<L: ModelLoader> Controller<L> {
    pub fn new(catalog: ModelCatalog, loader: L, sample_options: SampleOptions) -> Self {
        Self {
            catalog,
            enhancer: Enhancer::new(loader),
            sample_options,
            state: AppState::default(),
            in_flight: None,
            pending_model: None,
        }
    }

    pub const fn state(&self) -> &AppState {
        &self.state
    }

    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub const fn enhancer(&self) -> &Enhancer<L> {
        &self.enhancer
    }

    pub fn phase(&self) -> Phase {
        match self.in_flight.as_ref().map(SlotGuard::kind) {
            Some(JobKind::LoadModel) => Phase::ModelLoading,
            Some(JobKind::Enhance) => Phase::Inferring,
            None if self.state.origin.is_some() => Phase::ImageLoaded,
            None => Phase::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn model_loaded(&self) -> bool {
        self.enhancer.is_loaded()
    }

    pub fn model_label(&self) -> &str {
        &self.state.model_label
    }

    /// Name of the model currently being loaded, if any.
    pub fn loading_model(&self) -> Option<String> {
        self.pending_model
            .as_ref()
            .map(|pending| catalog::model_name(&pending.path))
    }

    pub fn status(&self) -> &Status {
        &self.state.status
    }

    pub fn model_names(&self) -> Vec<String> {
        self.catalog.list()
    }

    /// A new image may not replace the origin while it is being enhanced.
    pub fn check_can_open(&self) -> Result<(), Notice> {
        match self.in_flight.as_ref().map(SlotGuard::kind) {
            Some(JobKind::Enhance) => Err(Notice::Busy(JobKind::Enhance)),
            _ => Ok(()),
        }
    }

    /// Decode `path` and make it both the origin and the clean image.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn open_image(&mut self, path: &Path) -> Result<(), Notice> {
        self.check_can_open()?;

        let decoded = image::open(path).map_err(|e| {
            let error = EnhanceError::image(path.display(), "open", e);
            warn!(error = %error, "open image failed");
            Notice::OpenFailed(error.to_string())
        })?;
        let image = pipeline::to_channels3(&decoded);
        let (width, height) = image.dimensions();
        info!(width, height, "image opened");

        self.state.resize.reset(width, height);
        self.state.origin = Some(image.clone());
        self.state.clean = Some(image);
        self.state.source = Some(path.to_path_buf());
        self.state.vignette.dirty = true;
        self.refresh_vignette();
        Ok(())
    }

    /// Map a list entry to a model file, or ask for one when it is not on disk.
    pub fn resolve_model(&self, name: &str) -> ModelChoice {
        match self.catalog.resolve(name) {
            Some(path) => ModelChoice::Resolved(path),
            None => {
                debug!(name, dir = %self.catalog.dir().display(), "model not in catalog");
                ModelChoice::PickFile
            }
        }
    }

    /// Start loading `path` on a background job.
    pub fn start_model_load(
        &mut self,
        path: PathBuf,
    ) -> Result<JobHandle<Arc<dyn EnhancementModel>>, Notice> {
        if !path.is_file() {
            return Err(Notice::ModelMissing(path));
        }
        let guard = self
            .enhancer
            .slot()
            .try_acquire(JobKind::LoadModel)
            .map_err(Notice::Busy)?;

        let name = catalog::model_name(&path);
        info!(%name, path = %path.display(), "loading model");
        let previous_label =
            std::mem::replace(&mut self.state.model_label, model_label(&name));

        let loader = self.enhancer.loader();
        let job_path = path.clone();
        let handle = job::spawn(JobKind::LoadModel, move || loader.load(&job_path));

        self.in_flight = Some(guard);
        self.pending_model = Some(PendingModel {
            path,
            previous_label,
        });
        Ok(handle)
    }

    pub fn finish_model_load(
        &mut self,
        result: JobResult<Arc<dyn EnhancementModel>>,
    ) -> Result<(), Notice> {
        self.in_flight = None;
        let pending = self.pending_model.take();

        match result {
            Ok(model) => {
                self.state.model_label = model_label(model.name());
                self.enhancer
                    .install(model, pending.map(|pending| pending.path));
                Ok(())
            }
            Err(failure) => {
                if let Some(pending) = pending {
                    self.state.model_label = pending.previous_label;
                }
                Err(Notice::LoadFailed(failure))
            }
        }
    }

    fn check_image(&self) -> Result<&RgbImage, Notice> {
        self.state.origin.as_ref().ok_or(Notice::NoImage)
    }

    fn check_model(&self) -> Result<Arc<dyn EnhancementModel>, Notice> {
        self.enhancer.handle().ok_or(Notice::NoModel)
    }

    /// Resize, crop and enhance the origin image on a background job.
    pub fn start_enhance(&mut self) -> Result<JobHandle<RgbImage>, Notice> {
        let origin = self.check_image()?.clone();
        let model = self.check_model()?;
        let guard = self
            .enhancer
            .slot()
            .try_acquire(JobKind::Enhance)
            .map_err(Notice::Busy)?;

        let (target_height, target_width) = self.state.resize.target();
        let options = self.sample_options;
        info!(target_height, target_width, model = model.name(), "enhance started");

        let handle = job::spawn(JobKind::Enhance, move || {
            let prepared = pipeline::prepare_for_inference(&origin, target_height, target_width)?;
            pipeline::sample(&prepared, options, |input| model.enhance(input)).into_result()
        });

        self.in_flight = Some(guard);
        self.set_status(STATUS_ENHANCING);
        Ok(handle)
    }

    /// On failure the previous clean image stays on display.
    pub fn finish_enhance(&mut self, result: JobResult<RgbImage>) -> Result<(), Notice> {
        self.in_flight = None;

        match result {
            Ok(image) => {
                info!(width = image.width(), height = image.height(), "enhance finished");
                self.state.clean = Some(image);
                self.state.vignette.dirty = true;
                self.refresh_vignette();
                self.set_status(STATUS_DONE);
                Ok(())
            }
            Err(failure) => {
                self.set_status(STATUS_FAILED);
                Err(Notice::EnhanceFailed(failure))
            }
        }
    }

    /// Apply typed width/height input; the other field follows the source ratio.
    pub fn edit_dimension(&mut self, dimension: Dimension, text: &str) -> bool {
        self.state.resize.edit(dimension, text)
    }

    pub fn set_vignette_strength(&mut self, strength: f32) {
        self.state.vignette.strength = strength;
        self.state.vignette.dirty = true;
    }

    /// Recompute the displayed image from the clean one if the vignette changed.
    pub fn refresh_vignette(&mut self) -> bool {
        if !self.state.vignette.dirty {
            return false;
        }
        self.state.vignette.dirty = false;

        let Some(clean) = &self.state.clean else {
            return false;
        };
        let scale = self.state.vignette.scale();
        debug!(scale, "update vignette");
        self.state.canvas.set_image(vignette::apply(clean, scale));
        true
    }

    pub fn can_save(&self) -> bool {
        self.state.canvas.image().is_some()
    }

    /// File name offered by the save dialog.
    pub fn suggested_file_name(&self) -> String {
        let stem = self
            .state
            .source
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        format!("{stem}_enhanced.png")
    }

    /// Write the displayed image. Without an image this does nothing and returns
    /// `Ok(None)`; otherwise the path actually written.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<Option<PathBuf>, Notice> {
        let Some(image) = self.state.canvas.image() else {
            debug!("nothing to save");
            return Ok(None);
        };

        let (path, format) = output_target(path);
        image.save_with_format(&path, format).map_err(|e| {
            let error = EnhanceError::image(path.display(), "save", e);
            warn!(error = %error, "save failed");
            Notice::SaveFailed(error.to_string())
        })?;
        info!(path = %path.display(), "image saved");
        Ok(Some(path))
    }

    /// Show `text` and return its generation for a later [`Controller::expire_status`].
    pub fn set_status(&mut self, text: &str) -> u64 {
        let status = &mut self.state.status;
        status.text = text.to_string();
        status.generation += 1;
        status.generation
    }

    /// Revert to [`STATUS_READY`] unless a newer status replaced `generation`.
    pub fn expire_status(&mut self, generation: u64) -> bool {
        if self.state.status.generation != generation {
            return false;
        }
        self.state.status.text = STATUS_READY.to_string();
        true
    }

    pub fn resize_canvas(&mut self, width: u32, height: u32) {
        self.state.canvas.request_resize(width, height);
    }

    pub fn refresh_canvas(&mut self) -> bool {
        self.state.canvas.refresh()
    }
}

fn model_label(name: &str) -> String {
    format!("Model: {name}")
}

/// PNG or JPEG by extension; anything else is saved as PNG with `.png` appended.
fn output_target(path: &Path) -> (PathBuf, ImageFormat) {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => (path.to_path_buf(), ImageFormat::Png),
        Some("jpg" | "jpeg") => (path.to_path_buf(), ImageFormat::Jpeg),
        _ => {
            let mut appended = path.as_os_str().to_os_string();
            appended.push(".png");
            (PathBuf::from(appended), ImageFormat::Png)
        }
    }
}

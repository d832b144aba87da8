use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use ndarray::prelude::*;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::{
    errors::{EnhanceError, Result},
    traits::{EnhancementModel, ModelLoader},
};

/// File extension of serialized graphs in the model directory.
pub const MODEL_EXTENSION: &str = "onnx";

pub const INPUT_IMAGE: &str = "input_image";
pub const INPUT_HEIGHT: &str = "height";
pub const INPUT_WIDTH: &str = "width";
pub const OUTPUT_IMAGE: &str = "output_image";

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub use_gpu: bool,
    pub device_id: i32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            use_gpu: true,
            device_id: 0,
        }
    }
}

/// An enhancement graph running on ONNX Runtime.
///
/// The graph takes `input_image` (f32, H x W x 3, scaled to [-1, 1]) and, when
/// declared, the `height` / `width` scalars. It produces `output_image`.
pub struct Model {
    name: String,
    takes_dimensions: bool,
    session: Mutex<Session>,
}

impl Model {
    #[instrument(level = "info", skip_all, fields(path = %model_path.display()))]
    pub fn new(model_path: &Path, options: SessionOptions) -> Result<Self> {
        let load_error = |reason: String| EnhanceError::Load {
            path: model_path.to_path_buf(),
            reason,
        };

        if !model_path.is_file() {
            return Err(load_error("model file does not exist".to_string()));
        }

        let mut builder =
            SessionBuilder::new().map_err(|e| load_error(format!("session builder: {e}")))?;
        if options.use_gpu {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build()])
                .map_err(|e| load_error(format!("execution provider: {e}")))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_error(e.to_string()))?;

        let missing = |name: &str| EnhanceError::MissingTensor {
            path: model_path.to_path_buf(),
            name: name.to_string(),
        };
        let has_input = |name: &str| session.inputs.iter().any(|input| input.name == name);

        if !has_input(INPUT_IMAGE) {
            return Err(missing(INPUT_IMAGE));
        }
        if !session.outputs.iter().any(|output| output.name == OUTPUT_IMAGE) {
            return Err(missing(OUTPUT_IMAGE));
        }
        let takes_dimensions = has_input(INPUT_HEIGHT) && has_input(INPUT_WIDTH);

        let name = model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(%name, takes_dimensions, "model loaded");

        Ok(Self {
            name,
            takes_dimensions,
            session: Mutex::new(session),
        })
    }

    /// Run the graph on a normalised H x W x 3 tensor.
    pub fn predict(&self, tensor: ArrayView3<f32>) -> Result<RgbImage> {
        let (height, width, _) = tensor.dim();
        let tensor = tensor.as_standard_layout();
        let height_value = arr0(height as i32);
        let width_value = arr0(width as i32);

        let image_input = TensorRef::from_array_view(&tensor)
            .map_err(|e| EnhanceError::infer("input tensor", e))?;

        let mut session = self.session.lock();
        let outputs = if self.takes_dimensions {
            let height_input = TensorRef::from_array_view(&height_value)
                .map_err(|e| EnhanceError::infer("height tensor", e))?;
            let width_input = TensorRef::from_array_view(&width_value)
                .map_err(|e| EnhanceError::infer("width tensor", e))?;
            session.run(ort::inputs![
                INPUT_IMAGE => image_input,
                INPUT_HEIGHT => height_input,
                INPUT_WIDTH => width_input,
            ])
        } else {
            session.run(ort::inputs![INPUT_IMAGE => image_input])
        }
        .map_err(|e| EnhanceError::infer("session run", e))?;

        let output = &outputs[OUTPUT_IMAGE];
        let pixels = match output.try_extract_array::<u8>() {
            Ok(view) => view.to_owned(),
            Err(_) => output
                .try_extract_array::<f32>()
                .map_err(|e| EnhanceError::infer("output extraction", e))?
                .mapv(|v| v.round().clamp(0.0, 255.0) as u8),
        };
        debug!(shape = ?pixels.shape(), "inference finished");

        tensor_to_image(pixels.view())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("takes_dimensions", &self.takes_dimensions)
            .finish_non_exhaustive()
    }
}

impl EnhancementModel for Model {
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        let tensor = image_to_tensor(image)?;
        self.predict(tensor.view())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Loads [`Model`]s with a fixed set of session options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader {
    pub options: SessionOptions,
}

impl OnnxLoader {
    pub const fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn EnhancementModel>> {
        let model = Model::new(path, self.options)?;
        Ok(Arc::new(model))
    }
}

/// Scale 8-bit pixels into the [-1, 1] range the graph was trained on.
pub fn image_to_tensor(image: &RgbImage) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / 127.5 - 1.0)
        .collect();
    Ok(Array3::from_shape_vec(
        (height as usize, width as usize, 3),
        data,
    )?)
}

/// Read an output tensor shaped `[1, .., 1, H, W, 3]` back into an image.
pub fn tensor_to_image(tensor: ArrayViewD<u8>) -> Result<RgbImage> {
    let original_shape = tensor.shape().to_vec();
    let mismatch = || EnhanceError::ShapeMismatch {
        expected: "[1, H, W, 3]".to_string(),
        actual: format!("{original_shape:?}"),
    };

    let mut tensor = tensor;
    while tensor.ndim() > 3 && tensor.shape()[0] == 1 {
        tensor = tensor.index_axis_move(Axis(0), 0);
    }
    let tensor = tensor.into_dimensionality::<Ix3>().map_err(|_| mismatch())?;
    let (height, width, channels) = tensor.dim();
    if channels != 3 || height == 0 || width == 0 {
        return Err(mismatch());
    }

    let raw = tensor.iter().copied().collect();
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(mismatch)
}

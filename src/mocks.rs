use std::path::Path;
use std::sync::Arc;

use image::{imageops, imageops::FilterType, RgbImage};
use parking_lot::{Condvar, Mutex};

use crate::{
    errors::{EnhanceError, Result},
    traits::{EnhancementModel, ModelLoader},
};

/// What a mock model does with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehaviour {
    Identity,
    Invert,
    Upscale2x,
    Failing,
}

/// Holds mock work back until the test opens it.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, condvar) = &*self.inner;
        *open.lock() = true;
        condvar.notify_all();
    }

    pub fn wait(&self) {
        let (open, condvar) = &*self.inner;
        let mut open = open.lock();
        condvar.wait_while(&mut open, |open| !*open);
    }
}

/// Model stand-in for tests; never touches an ML runtime.
#[derive(Debug)]
pub struct MockModel {
    name: String,
    behaviour: MockBehaviour,
    gate: Option<Gate>,
}

impl MockModel {
    pub fn new(name: &str, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            gate: None,
        }
    }

    /// Inference waits on `gate`.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl EnhancementModel for MockModel {
    fn enhance(&self, image: &RgbImage) -> Result<RgbImage> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match self.behaviour {
            MockBehaviour::Identity => Ok(image.clone()),
            MockBehaviour::Invert => {
                let mut output = image.clone();
                imageops::invert(&mut output);
                Ok(output)
            }
            MockBehaviour::Upscale2x => Ok(imageops::resize(
                image,
                image.width() * 2,
                image.height() * 2,
                FilterType::Nearest,
            )),
            MockBehaviour::Failing => Err(EnhanceError::infer(
                "mock forward pass",
                "runtime exception",
            )),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hands out [`MockModel`]s named after the file stem, without touching the disk.
#[derive(Debug, Clone)]
pub struct MockLoader {
    behaviour: MockBehaviour,
    broken: Vec<String>,
    gate: Option<Gate>,
}

impl MockLoader {
    pub const fn new(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            broken: Vec::new(),
            gate: None,
        }
    }

    /// Loading a file with this stem fails as a malformed graph would.
    pub fn with_broken(mut self, stem: &str) -> Self {
        self.broken.push(stem.to_string());
        self
    }

    /// Both loading and inference wait on `gate`.
    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

impl ModelLoader for MockLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn EnhancementModel>> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.broken.contains(&stem) {
            return Err(EnhanceError::Load {
                path: path.to_path_buf(),
                reason: "malformed graph".to_string(),
            });
        }

        let model = MockModel::new(&stem, self.behaviour);
        Ok(match &self.gate {
            Some(gate) => Arc::new(model.with_gate(gate.clone())),
            None => Arc::new(model),
        })
    }
}

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::model::MODEL_EXTENSION;

/// The directory of pretrained models offered in the selection list.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Model names (file stems) found directly in the directory, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_model_file(e.path()))
            .map(|e| model_name(e.path()))
            .collect();
        names.sort();
        names
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{MODEL_EXTENSION}"))
    }

    /// The model file for `name`, if it exists.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let path = self.path_for(name);
        path.is_file().then_some(path)
    }
}

pub fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
}

pub fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

use crate::{
    config::BatchArgs,
    enhancer::Enhancer,
    errors::{EnhanceError, Result},
    job::JobKind,
    model::{OnnxLoader, SessionOptions},
    pipeline::{self, SampleOptions},
    traits::ModelLoader,
};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub path: PathBuf,
    pub save_path: PathBuf,
    pub denoise: bool,
    pub denoise_after: bool,
}

impl BatchItem {
    pub fn new(path: impl Into<PathBuf>, save_path: impl Into<PathBuf>, options: SampleOptions) -> Self {
        Self {
            path: path.into(),
            save_path: save_path.into(),
            denoise: options.denoise,
            denoise_after: options.denoise_after,
        }
    }

    pub const fn options(&self) -> SampleOptions {
        SampleOptions {
            denoise: self.denoise,
            denoise_after: self.denoise_after,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

/// Files waiting to be enhanced with the currently loaded model.
#[derive(Debug, Default)]
pub struct BatchQueue {
    items: Vec<BatchItem>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect images from files and directories, mirroring directory layout under `output_dir`.
    pub fn from_inputs(
        inputs: &[PathBuf],
        output_dir: &Path,
        format: &str,
        options: SampleOptions,
    ) -> Self {
        let mut queue = Self::new();
        for input in inputs {
            if input.is_dir() {
                let files = WalkDir::new(input)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && ImageFormat::from_path(e.path()).is_ok());
                for entry in files {
                    let relative = entry.path().strip_prefix(input).unwrap_or(entry.path());
                    let save_path = output_dir.join(relative).with_extension(format);
                    queue.add(BatchItem::new(entry.path(), save_path, options));
                }
            } else if let Some(file_name) = input.file_name() {
                let save_path = output_dir.join(file_name).with_extension(format);
                queue.add(BatchItem::new(input.as_path(), save_path, options));
            }
        }
        queue
    }

    pub fn add(&mut self, item: BatchItem) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Enhance every queued file. A failing file is logged and counted, never fatal.
    #[instrument(level = "info", skip_all, fields(items = self.items.len()))]
    pub fn process<L: ModelLoader>(&self, enhancer: &Enhancer<L>) -> Result<BatchReport> {
        if !enhancer.is_loaded() {
            return Err(EnhanceError::ModelNotLoaded);
        }
        let _guard = enhancer
            .slot()
            .try_acquire(JobKind::Enhance)
            .map_err(|busy| EnhanceError::Validation {
                field: "model".to_string(),
                reason: format!("is busy with a {busy} job"),
            })?;

        let progress_bar = ProgressBar::new(self.items.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            progress_bar.set_style(style.progress_chars("#>-"));
        }

        let outcomes: Vec<_> = self
            .items
            .par_iter()
            .progress_with(progress_bar.clone())
            .map(|item| (item, process_item(item, enhancer)))
            .collect();
        progress_bar.finish();

        let mut report = BatchReport::default();
        for (item, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    error!(path = %item.path.display(), error = %e, "batch item failed");
                    report.failed.push((item.path.clone(), e.to_string()));
                }
            }
        }
        info!(succeeded = report.succeeded, failed = report.failed.len(), "batch finished");
        Ok(report)
    }
}

fn process_item<L: ModelLoader>(item: &BatchItem, enhancer: &Enhancer<L>) -> Result<()> {
    let image = image::open(&item.path)
        .map_err(|e| EnhanceError::image(item.path.display(), "open", e))?;
    let image = pipeline::to_channels3(&image);
    let cropped = pipeline::crop_to_stride(&image)?;

    // A failed pass leaves nothing worth writing.
    let enhanced = pipeline::sample(&cropped, item.options(), |input| enhancer.infer(input))
        .into_result()?;

    if let Some(parent) = item.save_path.parent() {
        fs::create_dir_all(parent).map_err(|e| EnhanceError::Io {
            path: parent.to_path_buf(),
            operation: "create output directory".to_string(),
            source: e,
        })?;
    }
    let format = ImageFormat::from_path(&item.save_path).unwrap_or(ImageFormat::Png);
    enhanced
        .save_with_format(&item.save_path, format)
        .map_err(|e| EnhanceError::image(item.save_path.display(), "save", e))
}

/// Load the model named on the command line and enhance every input.
pub fn run(args: &BatchArgs, session: SessionOptions) -> Result<BatchReport> {
    let mut enhancer = Enhancer::new(OnnxLoader::new(session));
    enhancer.load(&args.model)?;

    let queue = BatchQueue::from_inputs(
        &args.inputs,
        &args.output_dir,
        &args.format,
        args.sample_options(),
    );
    if queue.is_empty() {
        warn!("no input images found");
        return Ok(BatchReport::default());
    }
    queue.process(&enhancer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_inputs_mirrors_layout() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input_dir = temp_dir.path().join("photos");
        fs::create_dir_all(input_dir.join("trip"))?;
        fs::write(input_dir.join("trip/beach.jpg"), b"")?;
        fs::write(input_dir.join("notes.txt"), b"")?;
        let single = temp_dir.path().join("cat.png");

        let output_dir = temp_dir.path().join("out");
        let queue = BatchQueue::from_inputs(
            &[input_dir, single.clone()],
            &output_dir,
            "jpg",
            SampleOptions::default(),
        );

        assert_eq!(queue.len(), 2);
        let save_paths: Vec<_> = queue.items().iter().map(|i| i.save_path.clone()).collect();
        assert!(save_paths.contains(&output_dir.join("trip/beach.jpg")));
        assert!(save_paths.contains(&output_dir.join("cat.jpg")));
        Ok(())
    }

    #[test]
    fn test_add_and_clear() {
        let mut queue = BatchQueue::new();
        queue
            .add(BatchItem::new("a.png", "out/a.png", SampleOptions::default()))
            .add(BatchItem::new(
                "b.png",
                "out/b.png",
                SampleOptions {
                    denoise: true,
                    denoise_after: false,
                },
            ));
        assert_eq!(queue.len(), 2);
        assert!(queue.items()[1].denoise);

        queue.clear();
        assert!(queue.is_empty());
    }
}

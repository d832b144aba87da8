use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use image::ImageFormat;

use crate::{model::SessionOptions, pipeline::SampleOptions};

const MODEL_DIR_NAME: &str = "pretrained";

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Directory searched for `.onnx` models
    #[arg(long, env = "FANTASTIC_FILTER_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Run inference on the CPU only
    #[arg(long)]
    pub cpu: bool,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Denoise the input before inference
    #[arg(long)]
    pub denoise: bool,

    /// Denoise the network output
    #[arg(long)]
    pub denoise_after: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Enhance files without opening a window
    Batch(BatchArgs),
}

#[derive(Args, Clone, Debug)]
pub struct BatchArgs {
    #[arg(short, long)]
    pub model: PathBuf,

    #[arg(short, long, default_value = "enhanced")]
    pub output_dir: PathBuf,

    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    #[arg(long)]
    pub denoise: bool,

    #[arg(long)]
    pub denoise_after: bool,

    /// Image files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

impl Config {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            use_gpu: !self.cpu,
            device_id: self.device_id,
        }
    }

    pub fn sample_options(&self) -> SampleOptions {
        SampleOptions {
            denoise: self.denoise,
            denoise_after: self.denoise_after,
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(default_model_dir)
    }
}

impl BatchArgs {
    pub fn sample_options(&self) -> SampleOptions {
        SampleOptions {
            denoise: self.denoise,
            denoise_after: self.denoise_after,
        }
    }
}

/// `pretrained/` next to the executable if it exists, else under the working directory.
pub fn default_model_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MODEL_DIR_NAME)))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from(MODEL_DIR_NAME))
}

fn check_format(s: &str) -> Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{s}`"))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{s} is not supported. {supported_message}"))?;
    if !format.writing_enabled() {
        return Err(format!("{s} is not supported. {supported_message}"));
    }

    Ok(s.to_string())
}

use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the enhancement pipeline.
///
/// Each variant carries the context of its failure domain (model loading, inference,
/// file I/O, user input) so callers can report a useful message without parsing
/// strings. [`EnhanceError::kind`] groups the variants into the four categories the
/// user interface distinguishes.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Model load error: {reason} ({path:?})")]
    Load { path: PathBuf, reason: String },

    #[error("Model load error: graph {path:?} has no tensor named `{name}`")]
    MissingTensor { path: PathBuf, name: String },

    #[error("Inference error: {operation} failed: {reason}")]
    Infer { operation: String, reason: String },

    #[error("Inference error: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Inference error: no model is loaded")]
    ModelNotLoaded,

    #[error("Filesystem error: {operation} failed for {path:?}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error: {operation} failed (file: {path})")]
    Image {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Background job `{job}` stopped before reporting a result")]
    JobAborted { job: String },
}

/// The four failure categories surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Load,
    Infer,
    Io,
    UserInput,
}

impl EnhanceError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Load { .. } | Self::MissingTensor { .. } => ErrorKind::Load,
            Self::Infer { .. }
            | Self::ShapeMismatch { .. }
            | Self::ModelNotLoaded
            | Self::JobAborted { .. } => ErrorKind::Infer,
            Self::Io { .. } | Self::Image { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::UserInput,
        }
    }

    pub(crate) fn infer(operation: &str, reason: impl std::fmt::Display) -> Self {
        Self::Infer {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn image(
        path: impl std::fmt::Display,
        operation: &str,
        source: image::ImageError,
    ) -> Self {
        Self::Image {
            path: path.to_string(),
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, EnhanceError>;

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build [`EnhanceError::Io`] itself;
/// this is the fallback for `?` on bare I/O calls.
impl From<std::io::Error> for EnhanceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image errors.
impl From<image::ImageError> for EnhanceError {
    fn from(err: image::ImageError) -> Self {
        Self::image("unknown", "image processing", err)
    }
}

/// Shape errors only arise while moving tensors in and out of the runtime.
impl From<ndarray::ShapeError> for EnhanceError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::infer("tensor shape conversion", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let load = EnhanceError::MissingTensor {
            path: "model.onnx".into(),
            name: "output_image".to_string(),
        };
        assert_eq!(load.kind(), ErrorKind::Load);
        assert_eq!(EnhanceError::ModelNotLoaded.kind(), ErrorKind::Infer);

        let io: EnhanceError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.kind(), ErrorKind::Io);

        let input = EnhanceError::Validation {
            field: "width".to_string(),
            reason: "must be numeric".to_string(),
        };
        assert_eq!(input.kind(), ErrorKind::UserInput);
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = EnhanceError::MissingTensor {
            path: "pretrained/iphone.onnx".into(),
            name: "input_image".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("input_image"));
        assert!(message.contains("iphone.onnx"));
    }
}

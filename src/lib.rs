pub mod app;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod display;
pub mod enhancer;
pub mod errors;
pub mod imageops;
pub mod job;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod resize;
pub mod traits;

pub mod mocks;

pub use config::Config;
pub use controller::{Controller, Notice};
pub use enhancer::Enhancer;
pub use errors::{EnhanceError, ErrorKind, Result};
pub use model::{Model, OnnxLoader, SessionOptions};
pub use traits::*;

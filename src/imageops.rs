pub mod convert_color;
pub mod denoise;
pub mod vignette;

pub use denoise::{denoise_colored, DenoiseParams};

/// Round and saturate a float channel value back into 8 bits.
pub fn saturate_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

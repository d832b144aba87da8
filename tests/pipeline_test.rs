use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

use fantastic_filter::{
    errors::EnhanceError,
    imageops::vignette,
    mocks::{MockBehaviour, MockModel},
    pipeline::{self, SampleOptions},
    resize::{linked_dimension, Dimension},
    EnhancementModel, Result,
};

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
    })
}

#[test]
fn test_prepare_resizes_then_crops_to_stride() -> Result<()> {
    let prepared = pipeline::prepare_for_inference(&gradient(123, 77), 10, 18)?;
    assert_eq!(prepared.dimensions(), (16, 8));
    Ok(())
}

#[test]
fn test_prepared_rgba_input_reaches_the_model() -> Result<()> {
    let rgba = RgbaImage::from_pixel(24, 16, image::Rgba([10, 20, 30, 0]));
    let rgb = pipeline::to_channels3(&DynamicImage::ImageRgba8(rgba));
    let prepared = pipeline::prepare_for_inference(&rgb, 16, 24)?;

    let model = MockModel::new("identity", MockBehaviour::Identity);
    let output = pipeline::sample(&prepared, SampleOptions::default(), |i| model.enhance(i))
        .into_result()?;
    assert_eq!(output.get_pixel(3, 3), &Rgb([10, 20, 30]));
    Ok(())
}

#[test]
fn test_sample_with_denoise_keeps_model_resolution() -> Result<()> {
    let model = MockModel::new("upscale", MockBehaviour::Upscale2x);
    let options = SampleOptions {
        denoise: true,
        denoise_after: true,
    };
    let output = pipeline::sample(&gradient(16, 8), options, |i| model.enhance(i)).into_result()?;
    assert_eq!(output.dimensions(), (32, 16));
    Ok(())
}

#[test]
fn test_failed_pass_yields_zero_image_and_error() {
    let model = MockModel::new("failing", MockBehaviour::Failing);
    let sampled = pipeline::sample(&gradient(16, 8), SampleOptions::default(), |i| {
        model.enhance(i)
    });

    assert_eq!(sampled.image.dimensions(), (16, 8));
    assert!(sampled.image.pixels().all(|p| p.0 == [0, 0, 0]));
    assert!(matches!(sampled.into_result(), Err(EnhanceError::Infer { .. })));
}

#[test]
fn test_vignette_from_clean_copy_is_not_compounded() {
    let clean = gradient(40, 30);
    let direct = vignette::apply(&clean, 0.8);

    let reset = vignette::apply(&clean, vignette::NO_EFFECT_SCALE);
    assert_eq!(reset, clean);
    assert_eq!(vignette::apply(&reset, 0.8), direct);
}

#[test]
fn test_linked_dimensions_follow_source_ratio() {
    for (width, height) in [(1920u32, 1080u32), (3, 7), (640, 480), (1, 1000)] {
        for target_height in [1u32, 8, 99, 720, 4321] {
            let target_width = linked_dimension(Dimension::Height, target_height, width, height);
            let exact = f64::from(target_height) * f64::from(width) / f64::from(height);
            assert!(
                exact - f64::from(target_width) < 1.0 && f64::from(target_width) <= exact,
                "{width}x{height} -> {target_width}x{target_height}"
            );
        }
    }
}

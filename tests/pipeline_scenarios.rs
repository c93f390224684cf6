//! End-to-end pipeline scenarios
//!
//! Every scenario runs without model files: the generator is built with
//! classical-only capabilities so segmentation goes through GrabCut.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use white_bg::{
    OutputMode, PipelineConfig, Result, SegmentationBackend, SegmentationCapabilities,
    SegmentationOutcome, WhiteBgError, WhiteBgGenerator,
};

/// 300x300 solid red image with a solid blue disc (radius 100) in the middle
fn red_with_blue_disc() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(300, 300, |x, y| {
        let dx = f64::from(x) - 150.0;
        let dy = f64::from(y) - 150.0;
        if dx * dx + dy * dy <= 100.0 * 100.0 {
            Rgb([0, 0, 255])
        } else {
            Rgb([255, 0, 0])
        }
    }))
}

fn classical_config(mode: OutputMode) -> Result<PipelineConfig> {
    PipelineConfig::builder()
        .capabilities(SegmentationCapabilities::classical_only())
        .output_mode(mode)
        .build()
}

/// Backend that only counts how often it is called
struct CountingBackend {
    calls: Arc<AtomicUsize>,
}

impl SegmentationBackend for CountingBackend {
    fn segment(&mut self, image: &DynamicImage) -> Result<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageRgba8(image.to_rgba8()))
    }

    fn kind(&self) -> SegmentationOutcome {
        SegmentationOutcome::Model
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

#[test]
fn test_white_background_with_classical_fallback() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("disc_white.png");

    let mut generator = WhiteBgGenerator::new(classical_config(OutputMode::WhiteBackground)?)?;
    assert_eq!(generator.backend_name(), "grabcut");

    let result = generator.process_image(red_with_blue_disc(), Some(&output), None)?;

    assert_eq!(result.segmentation, SegmentationOutcome::Classical);
    assert_eq!(result.saved_to.as_deref(), Some(output.as_path()));
    assert!(output.is_file());

    let rgb = result.image.as_rgb8().expect("white background output is RGB");
    assert_eq!(rgb.dimensions(), (300, 300));

    for (x, y) in [(0, 0), (299, 0), (0, 299), (299, 299), (10, 150)] {
        assert_eq!(rgb.get_pixel(x, y).0, [255, 255, 255], "pixel ({x}, {y})");
    }

    let centre = rgb.get_pixel(150, 150).0;
    assert!(centre[2] > 200 && centre[0] < 60, "centre was {centre:?}");

    let saved = image::open(&output)?;
    assert_eq!(saved.dimensions(), (300, 300));
    Ok(())
}

#[test]
fn test_missing_input_fails_before_segmentation() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("never.png");
    let calls = Arc::new(AtomicUsize::new(0));

    let mut generator = WhiteBgGenerator::with_backend(
        classical_config(OutputMode::WhiteBackground)?,
        Box::new(CountingBackend {
            calls: Arc::clone(&calls),
        }),
    )?;

    let result = generator.process_image(
        temp_dir.path().join("does_not_exist.jpg"),
        Some(&output),
        None,
    );

    assert!(matches!(result, Err(WhiteBgError::InvalidInput(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
    Ok(())
}

#[test]
fn test_transparent_output_with_classical_fallback() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let requested = temp_dir.path().join("disc.jpg");

    let mut generator = WhiteBgGenerator::new(classical_config(OutputMode::TransparentPng)?)?;
    let result = generator.process_image(red_with_blue_disc(), Some(&requested), None)?;

    let saved = result.saved_to.expect("output was requested");
    assert_eq!(saved, temp_dir.path().join("disc.png"));
    assert!(!requested.exists());

    let reloaded = image::open(&saved)?;
    assert!(reloaded.color().has_alpha());

    let rgba = reloaded.to_rgba8();
    for (x, y) in [(0, 0), (299, 299), (5, 150)] {
        assert!(rgba.get_pixel(x, y)[3] < 10, "alpha at ({x}, {y})");
    }
    assert!(rgba.get_pixel(150, 150)[3] > 245);
    Ok(())
}

#[test]
fn test_resize_bounds_output_dimensions() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut generator = WhiteBgGenerator::with_backend(
        classical_config(OutputMode::WhiteBackground)?,
        Box::new(CountingBackend {
            calls: Arc::clone(&calls),
        }),
    )?;

    let result = generator.process_image(red_with_blue_disc(), None, Some(120))?;
    assert_eq!(result.original_dimensions, (300, 300));
    assert_eq!(result.image.dimensions(), (120, 120));

    let small = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([1, 2, 3])));
    let result = generator.process_image(small, None, Some(120))?;
    assert_eq!(result.image.dimensions(), (40, 20));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_array_sources() -> Result<()> {
    let mut generator = WhiteBgGenerator::with_backend(
        classical_config(OutputMode::WhiteBackground)?,
        Box::new(CountingBackend {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    )?;

    let bytes = ndarray::Array3::<u8>::from_elem((4, 6, 3), 90);
    let result = generator.process_image(bytes, None, None)?;
    assert_eq!(result.image.dimensions(), (6, 4));
    assert!(result.image.to_rgb8().pixels().all(|p| p.0 == [90, 90, 90]));

    let floats = ndarray::Array3::<f32>::from_elem((2, 2, 3), 1.0);
    let result = generator.process_image(floats, None, None)?;
    assert!(result.image.to_rgb8().pixels().all(|p| p.0 == [255, 255, 255]));
    Ok(())
}

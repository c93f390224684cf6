//! Output format handling service
//!
//! Maps output paths to encoders and derives output file names for the
//! single-image and batch modes.

use crate::{
    config::OutputMode,
    error::{Result, WhiteBgError},
};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

/// Suffix appended to the file stem for default white-background outputs
const WHITE_BG_SUFFIX: &str = "_white_bg";

/// Suffix appended to the file stem for default transparent outputs
const TRANSPARENT_SUFFIX: &str = "_transparent";

/// Service for handling output format conversions and naming
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Infer the encoder from an output path's extension
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidConfig` when the extension is missing or has no encoder
    ///
    /// # Examples
    /// ```rust
    /// use white_bg::services::OutputFormatHandler;
    /// use image::ImageFormat;
    ///
    /// assert_eq!(OutputFormatHandler::format_for_path("a.JPG").unwrap(), ImageFormat::Jpeg);
    /// assert!(OutputFormatHandler::format_for_path("a.txt").is_err());
    /// ```
    pub fn format_for_path<P: AsRef<Path>>(path: P) -> Result<ImageFormat> {
        let path_ref = path.as_ref();
        ImageFormat::from_path(path_ref)
            .ok()
            .filter(|format| format.writing_enabled())
            .ok_or_else(|| {
                WhiteBgError::invalid_config(format!(
                    "Cannot infer an output format from '{}'",
                    path_ref.display()
                ))
            })
    }

    /// Check if a format supports transparency (alpha channel)
    pub fn supports_transparency(format: ImageFormat) -> bool {
        !matches!(format, ImageFormat::Jpeg | ImageFormat::Bmp)
    }

    /// Convert an image to a colour type the target encoder accepts
    ///
    /// Alpha is dropped for formats without transparency; everything else is
    /// narrowed to 8-bit RGB or RGBA.
    pub fn prepare_for_format(image: &DynamicImage, format: ImageFormat) -> DynamicImage {
        if image.color().has_alpha() && Self::supports_transparency(format) {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
    }

    /// Whether a path already ends in `.png` (case-insensitive)
    pub fn has_png_extension<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }

    /// Final output path for a mode
    ///
    /// Transparent output is always PNG, so any other extension is rewritten
    /// to `.png`.
    pub fn resolve_output_path<P: AsRef<Path>>(path: P, mode: OutputMode) -> PathBuf {
        let path_ref = path.as_ref();
        if mode.keeps_alpha() && !Self::has_png_extension(path_ref) {
            path_ref.with_extension("png")
        } else {
            path_ref.to_path_buf()
        }
    }

    /// Output path for a batch item: `{output_dir}/{prefix}{file name}`
    ///
    /// In transparent mode the name is `{prefix}{stem}.png`.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` when the input has no file name
    pub fn batch_output_path<P: AsRef<Path>, Q: AsRef<Path>>(
        input: P,
        output_dir: Q,
        prefix: &str,
        mode: OutputMode,
    ) -> Result<PathBuf> {
        let input_ref = input.as_ref();
        let file_name = input_ref.file_name().ok_or_else(|| {
            WhiteBgError::invalid_input(format!("Input has no file name: {}", input_ref.display()))
        })?;

        let name = if mode.keeps_alpha() {
            let stem = input_ref.file_stem().unwrap_or(file_name);
            format!("{}{}.png", prefix, stem.to_string_lossy())
        } else {
            format!("{}{}", prefix, file_name.to_string_lossy())
        };

        Ok(output_dir.as_ref().join(name))
    }

    /// Default single-image output path next to the input
    ///
    /// `{stem}_white_bg{ext}` for white backgrounds, `{stem}_transparent.png`
    /// for transparent output.
    pub fn default_output_path<P: AsRef<Path>>(input: P, mode: OutputMode) -> PathBuf {
        let input_ref = input.as_ref();
        let stem = input_ref.file_stem().unwrap_or_default().to_string_lossy();
        let dir = input_ref.parent().unwrap_or(Path::new(""));

        let name = match mode {
            OutputMode::WhiteBackground => match input_ref.extension() {
                Some(ext) => format!("{}{}.{}", stem, WHITE_BG_SUFFIX, ext.to_string_lossy()),
                None => format!("{}{}.png", stem, WHITE_BG_SUFFIX),
            },
            OutputMode::TransparentPng => format!("{}{}.png", stem, TRANSPARENT_SUFFIX),
        };

        dir.join(name)
    }
}

//! Image I/O operations service
//!
//! This module separates file I/O operations from business logic,
//! making the system more testable and maintainable.

use crate::{
    error::{Result, WhiteBgError},
    services::format::OutputFormatHandler,
    types::ImageSource,
};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use ndarray::Array3;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Input file extensions accepted by the pipeline (lowercase, without dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp", "gif"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Check whether a path has a supported image extension (case-insensitive)
    ///
    /// # Examples
    /// ```rust
    /// use white_bg::services::ImageIOService;
    ///
    /// assert!(ImageIOService::is_supported_format("photo.JPG"));
    /// assert!(!ImageIOService::is_supported_format("notes.txt"));
    /// ```
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    /// Validate that a path exists and carries a supported extension
    ///
    /// Only the extension is inspected; file contents are not sniffed.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` when the file is missing or the extension unsupported
    pub fn validate_image_path<P: AsRef<Path>>(path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(WhiteBgError::invalid_input(format!(
                "Input file does not exist: {}",
                path_ref.display()
            )));
        }

        if !Self::is_supported_format(path_ref) {
            let extension = path_ref
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("none");
            return Err(WhiteBgError::invalid_input(format!(
                "Unsupported file format '{}' for {}. Supported: {}",
                extension,
                path_ref.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        Ok(())
    }

    /// Load an image from a file path
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` for missing or unsupported files
    /// - `WhiteBgError::Image` when the file cannot be decoded
    ///
    /// # Examples
    /// ```rust,no_run
    /// use white_bg::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        Self::validate_image_path(path_ref)?;

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                // Extension and content can disagree; retry with content sniffing
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref)
                    .map_err(|io_err| WhiteBgError::file_io_error("read image data", path_ref, &io_err))?;

                image::load_from_memory(&data).map_err(|content_err| {
                    log::debug!(
                        "Content-based detection failed for {}: {}",
                        path_ref.display(),
                        content_err
                    );
                    WhiteBgError::Image(e)
                })
            },
        }
    }

    /// Decode an image from encoded bytes
    ///
    /// # Errors
    /// - `WhiteBgError::Image` when the bytes are not a decodable image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// Convert an `H x W x C` array of 8-bit samples into an image
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidInput` for unsupported channel counts or empty arrays
    pub fn from_array(array: &Array3<u8>) -> Result<DynamicImage> {
        let (height, width, channels) = array.dim();
        if width == 0 || height == 0 {
            return Err(WhiteBgError::invalid_input("Image array has zero width or height"));
        }

        let width = u32::try_from(width)
            .map_err(|_| WhiteBgError::invalid_input("Image array too wide"))?;
        let height = u32::try_from(height)
            .map_err(|_| WhiteBgError::invalid_input("Image array too tall"))?;
        let data: Vec<u8> = array.iter().copied().collect();

        let image = match channels {
            1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
            other => {
                return Err(WhiteBgError::invalid_input(format!(
                    "Unsupported channel count {} (expected 1, 3 or 4)",
                    other
                )))
            },
        };

        image.ok_or_else(|| WhiteBgError::internal("Array data does not match its shape"))
    }

    /// Convert an `H x W x C` array of `[0, 1]` floats into an image
    ///
    /// # Errors
    /// - Same as [`ImageIOService::from_array`]
    pub fn from_float_array(array: &Array3<f32>) -> Result<DynamicImage> {
        let scaled = array.mapv(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
        Self::from_array(&scaled)
    }

    /// Resolve any [`ImageSource`] into a decoded image
    ///
    /// # Errors
    /// - Errors from the matching loader
    pub fn load_source(source: &ImageSource) -> Result<DynamicImage> {
        match source {
            ImageSource::Path(path) => Self::load_image(path),
            ImageSource::Image(image) => Ok(image.clone()),
            ImageSource::Array(array) => Self::from_array(array),
            ImageSource::FloatArray(array) => Self::from_float_array(array),
        }
    }

    /// Create a directory (and parents) if it does not exist yet
    ///
    /// # Errors
    /// - `WhiteBgError::Io` when the directory cannot be created
    pub fn ensure_output_directory<P: AsRef<Path>>(dir: P) -> Result<()> {
        let dir_ref = dir.as_ref();
        if dir_ref.as_os_str().is_empty() || dir_ref.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(dir_ref)
            .map_err(|e| WhiteBgError::file_io_error("create output directory", dir_ref, &e))
    }

    /// Save an image, inferring the encoding from the file extension
    ///
    /// JPEG output is written at `jpeg_quality` and drops alpha. PNG output
    /// uses the strongest compression level with adaptive filtering.
    ///
    /// # Errors
    /// - `WhiteBgError::InvalidConfig` when the extension has no encoder
    /// - `WhiteBgError::Io` / `WhiteBgError::Image` on write or encode failures
    ///
    /// # Examples
    /// ```rust,no_run
    /// use white_bg::services::ImageIOService;
    /// use image::DynamicImage;
    ///
    /// # let image = DynamicImage::new_rgb8(100, 100);
    /// ImageIOService::save_image(&image, "output.jpg", 95)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P, jpeg_quality: u8) -> Result<()> {
        let path_ref = path.as_ref();
        let format = OutputFormatHandler::format_for_path(path_ref)?;

        if let Some(parent) = path_ref.parent() {
            Self::ensure_output_directory(parent)?;
        }

        let prepared = OutputFormatHandler::prepare_for_format(image, format);
        let file = File::create(path_ref)
            .map_err(|e| WhiteBgError::file_io_error("create output file", path_ref, &e))?;
        let writer = BufWriter::new(file);

        let result = match format {
            ImageFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(writer, jpeg_quality);
                encoder.encode_image(&prepared.to_rgb8())
            },
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    writer,
                    CompressionType::Best,
                    PngFilterType::Adaptive,
                );
                prepared.write_with_encoder(encoder)
            },
            other => {
                drop(writer);
                prepared.save_with_format(path_ref, other)
            },
        };

        result.map_err(|e| {
            WhiteBgError::processing_stage_error(
                "image save",
                &format!("Failed to save as {:?}: {}", format, e),
                Some(&format!(
                    "{}x{}, path: {}",
                    prepared.width(),
                    prepared.height(),
                    path_ref.display()
                )),
            )
        })?;

        log::debug!("Saved {:?} image to {}", format, path_ref.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba};
    use tempfile::TempDir;

    #[test]
    fn test_supported_formats_case_insensitive() {
        for name in ["a.jpg", "a.JPEG", "a.png", "a.Bmp", "a.tiff", "a.webp", "a.GIF"] {
            assert!(ImageIOService::is_supported_format(name), "{name}");
        }
        assert!(!ImageIOService::is_supported_format("a.txt"));
        assert!(!ImageIOService::is_supported_format("a.tif"));
        assert!(!ImageIOService::is_supported_format("noext"));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = ImageIOService::validate_image_path("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, WhiteBgError::InvalidInput(_)));
    }

    #[test]
    fn test_validate_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let err = ImageIOService::validate_image_path(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported file format"));
    }

    #[test]
    fn test_save_and_load_png_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.png");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([1, 2, 3, 128])));

        ImageIOService::save_image(&image, &path, 95).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();

        assert_eq!(loaded.dimensions(), (8, 6));
        assert_eq!(loaded.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 128]);
    }

    #[test]
    fn test_save_jpeg_drops_alpha() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jpg");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 0])));

        ImageIOService::save_image(&image, &path, 95).unwrap();
        let loaded = image::open(&path).unwrap();
        assert!(!loaded.color().has_alpha());
    }

    #[test]
    fn test_save_unknown_extension_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.xyz");
        let image = DynamicImage::new_rgb8(4, 4);
        assert!(ImageIOService::save_image(&image, &path, 95).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_load_corrupt_file_is_image_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"not a png at all").unwrap();

        let err = ImageIOService::load_image(&path).unwrap_err();
        assert!(matches!(err, WhiteBgError::Image(_)));
    }

    #[test]
    fn test_from_array_channels() {
        let rgb = Array3::<u8>::from_elem((2, 3, 3), 7);
        let image = ImageIOService::from_array(&rgb).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.to_rgb8().get_pixel(2, 1), &Rgb([7, 7, 7]));

        let gray = Array3::<u8>::zeros((4, 4, 1));
        assert!(ImageIOService::from_array(&gray).is_ok());

        let rgba = Array3::<u8>::zeros((4, 4, 4));
        assert!(ImageIOService::from_array(&rgba).unwrap().color().has_alpha());

        let bad = Array3::<u8>::zeros((4, 4, 2));
        assert!(ImageIOService::from_array(&bad).is_err());
    }

    #[test]
    fn test_from_array_preserves_row_major_layout() {
        let mut array = Array3::<u8>::zeros((2, 2, 3));
        array[[0, 1, 0]] = 255;
        let image = ImageIOService::from_array(&array).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(1, 0), &Rgb([255, 0, 0]));
        assert_eq!(image.get_pixel(0, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_from_float_array_scales() {
        let array = Array3::<f32>::from_elem((1, 1, 3), 1.0);
        let image = ImageIOService::from_float_array(&array).unwrap();
        assert_eq!(image.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_ensure_output_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("b");
        ImageIOService::ensure_output_directory(&dir).unwrap();
        assert!(dir.is_dir());
        ImageIOService::ensure_output_directory(&dir).unwrap();
    }
}

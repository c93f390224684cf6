//! Bounded aspect-preserving downscale

use image::{imageops::FilterType, DynamicImage};

/// Downscales images so their longest side fits a bound
pub struct Resizer;

impl Resizer {
    /// Dimensions after bounding the longest side to `max_side`
    ///
    /// Returns the input dimensions unchanged when they already fit. The
    /// short side is rounded and never drops below one pixel.
    #[must_use]
    pub fn target_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= max_side || max_side == 0 {
            return (width, height);
        }

        // Half-up rounding of side * max_side / longest, exact in integers
        let scaled = |side: u32| {
            let numerator = 2 * u64::from(side) * u64::from(max_side) + u64::from(longest);
            let rounded = numerator / (2 * u64::from(longest));
            u32::try_from(rounded).unwrap_or(max_side).max(1)
        };

        if width >= height {
            (max_side, scaled(height))
        } else {
            (scaled(width), max_side)
        }
    }

    /// Downscale with Lanczos3 so the longest side is at most `max_side`
    ///
    /// Images that already fit are returned untouched. Images are never
    /// enlarged.
    #[must_use]
    pub fn resize_to_max(image: DynamicImage, max_side: u32) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let (new_width, new_height) = Self::target_dimensions(width, height, max_side);

        if (new_width, new_height) == (width, height) {
            return image;
        }

        log::debug!("Resizing {width}x{height} -> {new_width}x{new_height}");
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

//! Alpha compositing over a white canvas

use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Background value every channel blends towards
const WHITE: u32 = 255;

/// Blend one channel over white with integer rounding
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn blend_over_white(channel: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    let value = (u32::from(channel) * a + WHITE * (WHITE - a) + 127) / WHITE;
    value.min(WHITE) as u8
}

/// Flatten an image onto a white background
///
/// Images without alpha are converted to RGB unchanged. For images with alpha
/// every channel becomes `(c * a + 255 * (255 - a)) / 255`, rounded, so fully
/// transparent pixels turn pure white and fully opaque pixels keep their
/// colour. The output never carries an alpha channel.
#[must_use]
pub fn composite_on_white(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return DynamicImage::ImageRgb8(image.to_rgb8());
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut output = RgbImage::new(width, height);

    for (dst, src) in output.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = Rgb([
            blend_over_white(r, a),
            blend_over_white(g, a),
            blend_over_white(b, a),
        ]);
    }

    DynamicImage::ImageRgb8(output)
}

/// Original image as RGBA with every pixel fully opaque
///
/// Used when segmentation is impossible, so the pipeline still produces the
/// source image rather than an error.
#[must_use]
pub fn with_full_opacity(image: &DynamicImage) -> DynamicImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let rgba = RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        image::Rgba([r, g, b, 255])
    });
    DynamicImage::ImageRgba8(rgba)
}

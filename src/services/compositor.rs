//! Alpha compositing onto a white background

use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Composite a four-channel image over opaque white
///
/// Each output channel is `c * a / 255 + 255 * (255 - a) / 255`, rounded.
/// Fully opaque pixels keep their color and fully transparent pixels become
/// pure white. Dimensions are preserved.
#[must_use]
pub fn flatten_onto_white(image: &RgbaImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::new(width, height);

    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let [r, g, b, a] = src.0;
        *dst = Rgb([blend(r, a), blend(g, a), blend(b, a)]);
    }

    out
}

#[inline]
fn blend(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Compositing step used by the transformer
pub struct Compositor;

impl Compositor {
    /// Produce an opaque RGB image
    ///
    /// Images without alpha are converted directly; images with alpha are
    /// flattened onto white.
    #[must_use]
    pub fn to_opaque(image: &DynamicImage) -> DynamicImage {
        if image.color().has_alpha() {
            DynamicImage::ImageRgb8(flatten_onto_white(&image.to_rgba8()))
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
    }
}

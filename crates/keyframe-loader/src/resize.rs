//! Resize strategies for loaded keyframes.

use std::fmt;

use image::imageops::{overlay, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};

/// How a source image is mapped onto the target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Exact resize; aspect ratio is not preserved.
    Stretch,
    /// Aspect-preserving fit, letterboxed on a black canvas; never crops
    /// and never enlarges.
    Fit,
    /// Center crop to the target aspect ratio, then resize; never pads.
    #[default]
    Crop,
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stretch => "stretch",
            Self::Fit => "fit",
            Self::Crop => "crop",
        };
        f.write_str(s)
    }
}

/// Resize a source image to exactly (target_width, target_height).
pub fn resize_image(
    img: &DynamicImage,
    target_width: u32,
    target_height: u32,
    mode: ResizeMode,
) -> RgbImage {
    match mode {
        ResizeMode::Stretch => img
            .resize_exact(target_width, target_height, FilterType::Lanczos3)
            .to_rgb8(),
        ResizeMode::Fit => {
            let (src_w, src_h) = img.dimensions();
            // Thumbnail semantics: only ever shrinks. A source already
            // inside the target bounds keeps its native size.
            let thumb = if src_w > target_width || src_h > target_height {
                img.resize(target_width, target_height, FilterType::Lanczos3)
                    .to_rgb8()
            } else {
                img.to_rgb8()
            };
            // New canvas pixels are zeroed, i.e. black letterbox bars.
            let mut canvas = RgbImage::new(target_width, target_height);
            let x = (target_width - thumb.width()) / 2;
            let y = (target_height - thumb.height()) / 2;
            overlay(&mut canvas, &thumb, x as i64, y as i64);
            canvas
        }
        ResizeMode::Crop => {
            let (src_w, src_h) = img.dimensions();
            let src_aspect = src_w as f32 / src_h as f32;
            let target_aspect = target_width as f32 / target_height as f32;

            let (crop_w, crop_h) = if src_aspect > target_aspect {
                // Source is wider, crop width
                ((src_h as f32 * target_aspect) as u32, src_h)
            } else {
                // Source is taller, crop height
                (src_w, (src_w as f32 / target_aspect) as u32)
            };
            let x = (src_w - crop_w) / 2;
            let y = (src_h - crop_h) / 2;

            img.crop_imm(x, y, crop_w, crop_h)
                .resize_exact(target_width, target_height, FilterType::Lanczos3)
                .to_rgb8()
        }
    }
}

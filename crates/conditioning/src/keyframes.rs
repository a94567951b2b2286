//! Keyframe batch handling: batch normalization and pairwise segment
//! extraction with center-anchored bilinear resizing.

use candle_core::Tensor;
use image::imageops::{crop_imm, resize, FilterType};
use image::Rgb32FImage;

use crate::ConditioningError;

/// Normalize an image tensor to a `[N, H, W, 3]` batch.
///
/// A single `[H, W, 3]` image becomes a batch of one; a batch passes
/// through unchanged; anything else is rejected.
pub fn ensure_batch(img: &Tensor) -> Result<Tensor, ConditioningError> {
    match img.rank() {
        3 => Ok(img.unsqueeze(0)?),
        4 => Ok(img.clone()),
        _ => Err(ConditioningError::BadKeyframeShape {
            dims: img.dims().to_vec(),
        }),
    }
}

/// An ordered keyframe batch viewed as N-1 overlapping (start, end) pairs,
/// each resized to the target resolution on extraction.
#[derive(Debug)]
pub struct KeyframePairs {
    frames: Tensor,
    width: u32,
    height: u32,
}

impl KeyframePairs {
    /// Wrap a `[N, H, W, 3]` batch. Requires at least two keyframes.
    pub fn new(keyframes: &Tensor, width: u32, height: u32) -> Result<Self, ConditioningError> {
        let frames = ensure_batch(keyframes)?;
        let n = frames.dim(0)?;
        if n < 2 {
            return Err(ConditioningError::TooFewKeyframes { got: n });
        }
        Ok(Self {
            frames,
            width,
            height,
        })
    }

    pub fn num_segments(&self) -> usize {
        self.frames.dims()[0] - 1
    }

    /// Extract segment i as its resized (start, end) frame pair, each
    /// `[1, height, width, 3]`.
    pub fn segment(&self, i: usize) -> Result<(Tensor, Tensor), ConditioningError> {
        let start = self.frames.narrow(0, i, 1)?;
        let end = self.frames.narrow(0, i + 1, 1)?;
        Ok((
            resize_frame(&start, self.width, self.height)?,
            resize_frame(&end, self.width, self.height)?,
        ))
    }
}

/// Resize one `[1, H, W, 3]` frame to the target resolution: center crop to
/// the target aspect ratio, then bilinear resample. Matches the host's
/// "bilinear"/"center" upscale convention.
pub fn resize_frame(
    frame: &Tensor,
    target_width: u32,
    target_height: u32,
) -> Result<Tensor, ConditioningError> {
    let device = frame.device().clone();
    let (_, h, w, c) = frame.dims4()?;
    if c != 3 {
        return Err(ConditioningError::BadKeyframeShape {
            dims: frame.dims().to_vec(),
        });
    }
    if h == target_height as usize && w == target_width as usize {
        return Ok(frame.clone());
    }

    let data = frame.flatten_all()?.to_vec1::<f32>()?;
    let src = Rgb32FImage::from_raw(w as u32, h as u32, data).ok_or(
        ConditioningError::FrameLayout {
            width: w as u32,
            height: h as u32,
        },
    )?;

    let src_aspect = w as f32 / h as f32;
    let target_aspect = target_width as f32 / target_height as f32;
    let (crop_w, crop_h) = if src_aspect > target_aspect {
        // Source is wider, crop width
        (((h as f32) * target_aspect) as u32, h as u32)
    } else {
        // Source is taller, crop height
        (w as u32, ((w as f32) / target_aspect) as u32)
    };
    let x = (w as u32 - crop_w) / 2;
    let y = (h as u32 - crop_h) / 2;

    let cropped = crop_imm(&src, x, y, crop_w, crop_h).to_image();
    let resized = resize(&cropped, target_width, target_height, FilterType::Triangle);

    let out = Tensor::from_vec(
        resized.into_raw(),
        (1, target_height as usize, target_width as usize, 3),
        &device,
    )?;
    Ok(out)
}

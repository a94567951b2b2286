//! Per-segment tensor construction: the partially-known frame sequence fed
//! to the VAE and the matching grouped-frame mask.

use candle_core::{Tensor, D};

use crate::ConditioningError;

/// Number of frames for the requested fps and duration: fps*seconds plus
/// one trailing frame, rounded down to the nearest value congruent to
/// 1 mod 4 (the model consumes frames in groups of four plus an anchor).
pub fn video_length(fps: u32, seconds: u32) -> usize {
    let raw = (fps * seconds + 1) as usize;
    (raw - 1) / 4 * 4 + 1
}

/// Build the `[length, height, width, 3]` working sequence for one segment:
/// mid-gray throughout, the start keyframe as the first frame and the end
/// keyframe as the last. With length 1 the end keyframe wins, matching the
/// host's assign-then-overwrite order.
pub fn segment_frames(
    start: &Tensor,
    end: &Tensor,
    length: usize,
) -> Result<Tensor, ConditioningError> {
    let device = start.device();
    let (_, h, w, c) = start.dims4()?;
    let out = match length {
        0 | 1 => end.clone(),
        2 => Tensor::cat(&[start, end], 0)?,
        _ => {
            let gray = Tensor::full(0.5f32, (length - 2, h, w, c), device)?;
            Tensor::cat(&[start, &gray, end], 0)?
        }
    };
    Ok(out)
}

/// Build the conditioning mask for a concat-latent of shape
/// `[1, C, latent_t, latent_h, latent_w]`.
///
/// The mask starts as all-ones over `latent_t * 4` pixel-time steps (ones
/// mark frames to be generated), zeroes the first min(4, t) steps for the
/// start anchor and the last min(1, t) step for the end anchor, then
/// regroups into the latent's `[1, 4, latent_t, latent_h, latent_w]`
/// frame-group layout.
pub fn segment_mask(concat_latent: &Tensor) -> Result<Tensor, ConditioningError> {
    let dims = concat_latent.dims();
    if dims.len() != 5 {
        return Err(ConditioningError::BadKeyframeShape {
            dims: dims.to_vec(),
        });
    }
    let (latent_t, latent_h, latent_w) = (dims[2], dims[3], dims[4]);
    let t4 = latent_t * 4;

    let mut profile = vec![1.0f32; t4];
    let start_steps = 4.min(t4);
    for v in profile.iter_mut().take(start_steps) {
        *v = 0.0;
    }
    let end_steps = 1.min(t4);
    for v in profile.iter_mut().skip(t4 - end_steps) {
        *v = 0.0;
    }

    let mask = Tensor::from_vec(profile, (1, 1, t4, 1, 1), concat_latent.device())?
        .broadcast_as((1, 1, t4, latent_h, latent_w))?
        .contiguous()?;
    let mask = mask
        .reshape((1, latent_t, 4, latent_h, latent_w))?
        .transpose(1, 2)?;
    Ok(mask)
}

/// Concatenate two token-embedding tensors along the token axis.
pub(crate) fn cat_tokens(a: &Tensor, b: &Tensor) -> candle_core::Result<Tensor> {
    Tensor::cat(&[a, b], D::Minus2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn length_rounds_to_one_mod_four() {
        assert_eq!(video_length(16, 1), 17);
        assert_eq!(video_length(16, 2), 33);
        assert_eq!(video_length(1, 1), 1);
        assert_eq!(video_length(3, 1), 1);
        assert_eq!(video_length(4, 1), 5);
        for fps in 1..=30 {
            for secs in 1..=4 {
                assert_eq!(video_length(fps, secs) % 4, 1);
            }
        }
    }

    fn flat_frame(v: f32) -> Tensor {
        Tensor::full(v, (1usize, 2usize, 2usize, 3usize), &Device::Cpu).unwrap()
    }

    #[test]
    fn frames_anchor_start_and_end() {
        let frames = segment_frames(&flat_frame(0.1), &flat_frame(0.9), 9).unwrap();
        assert_eq!(frames.dims(), &[9, 2, 2, 3]);
        let v = frames.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let per_frame = 2 * 2 * 3;
        assert!((v[0] - 0.1).abs() < 1e-6);
        assert!((v[per_frame] - 0.5).abs() < 1e-6);
        assert!((v[7 * per_frame] - 0.5).abs() < 1e-6);
        assert!((v[8 * per_frame] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn single_frame_sequence_is_the_end_keyframe() {
        let frames = segment_frames(&flat_frame(0.1), &flat_frame(0.9), 1).unwrap();
        assert_eq!(frames.dims(), &[1, 2, 2, 3]);
        let v = frames.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!((v[0] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn mask_zeroes_anchored_time_steps() {
        let latent = Tensor::zeros((1, 16, 5, 3, 3), candle_core::DType::F32, &Device::Cpu)
            .unwrap();
        let mask = segment_mask(&latent).unwrap();
        assert_eq!(mask.dims(), &[1, 4, 5, 3, 3]);

        // Undo the regrouping to inspect the flat 20-step time profile.
        let flat = mask
            .transpose(1, 2)
            .unwrap()
            .contiguous()
            .unwrap()
            .reshape((1, 1, 20, 3, 3))
            .unwrap();
        for t in 0..20 {
            let step = flat.narrow(2, t, 1).unwrap();
            let v = step.flatten_all().unwrap().to_vec1::<f32>().unwrap();
            let expected = if t < 4 || t == 19 { 0.0 } else { 1.0 };
            assert!(v.iter().all(|&x| (x - expected).abs() < 1e-6), "step {t}");
        }
    }

    #[test]
    fn tiny_mask_is_fully_anchored() {
        // latent_t == 1 -> 4 pixel-time steps, all covered by the start
        // anchor, with the end anchor overlapping the last one.
        let latent =
            Tensor::zeros((1, 16, 1, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        let mask = segment_mask(&latent).unwrap();
        assert_eq!(mask.dims(), &[1, 4, 1, 2, 2]);
        let v = mask.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}

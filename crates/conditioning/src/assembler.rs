//! Top-level keyframe-to-video assembly.

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::host::{TextConditioning, TextEncoder, VisualEncoder};
use crate::keyframes::KeyframePairs;
use crate::prompt::PromptIndex;
use crate::segment::{segment_frames, segment_mask, video_length};
use crate::stack::{stack_conditioning, ConditioningEntry, StackPolicies};
use crate::vision::merge_for_segment;
use crate::{ClipVisionOutput, ConditioningError};

/// Assembler configuration for one host invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeToVideo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub seconds: u32,
    #[serde(default)]
    pub policies: StackPolicies,
}

/// Stacked conditioning for both prompt polarities plus the empty latent
/// sized for the full requested video.
#[derive(Debug)]
pub struct EncodeOutput {
    pub positive: Vec<ConditioningEntry>,
    pub negative: Vec<ConditioningEntry>,
    pub latent: Tensor,
}

impl KeyframeToVideo {
    pub fn new(width: u32, height: u32, fps: u32, seconds: u32) -> Self {
        Self {
            width,
            height,
            fps,
            seconds,
            policies: StackPolicies::default(),
        }
    }

    pub fn with_policies(mut self, policies: StackPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Assemble conditioning for every consecutive keyframe pair.
    ///
    /// Segments run sequentially; each one resolves its prompt, encodes
    /// both prompt polarities, anchors its two keyframes into a mid-gray
    /// working sequence for the VAE, and derives the matching grouped-frame
    /// mask. The per-segment records are then stacked along the batch axis
    /// under the configured mismatch policies. The same negative prompt is
    /// reused, unindexed, for every segment.
    pub fn encode(
        &self,
        clip: &dyn TextEncoder,
        vae: &dyn VisualEncoder,
        positive_prompt: &str,
        negative_prompt: &str,
        keyframes: &Tensor,
        clip_vision_outputs: Option<&[ClipVisionOutput]>,
    ) -> Result<EncodeOutput, ConditioningError> {
        let length = video_length(self.fps, self.seconds);
        let prompts = PromptIndex::parse(positive_prompt);
        let pairs = KeyframePairs::new(keyframes, self.width, self.height)?;
        let num_segments = pairs.num_segments();

        let scale = vae.spacial_compression_encode();
        let latent = Tensor::zeros(
            (
                num_segments,
                vae.latent_channels(),
                (length - 1) / 4 + 1,
                self.height as usize / scale,
                self.width as usize / scale,
            ),
            DType::F32,
            keyframes.device(),
        )?;

        let mut positive_conds: Vec<TextConditioning> = Vec::with_capacity(num_segments);
        let mut negative_conds: Vec<TextConditioning> = Vec::with_capacity(num_segments);
        let mut concat_latents: Vec<Tensor> = Vec::with_capacity(num_segments);
        let mut masks: Vec<Tensor> = Vec::with_capacity(num_segments);
        let mut vision_outputs: Vec<Option<ClipVisionOutput>> = Vec::with_capacity(num_segments);

        for i in 0..num_segments {
            let (start, end) = pairs.segment(i)?;

            let positive = prompts.resolve(i);
            info!(
                segment = i,
                prompt = %positive.chars().take(50).collect::<String>(),
                "encoding segment"
            );

            positive_conds.push(clip.encode(positive)?);
            negative_conds.push(clip.encode(negative_prompt)?);

            let frames = segment_frames(&start, &end, length)?;
            let concat_latent = vae.encode(&frames)?;
            masks.push(segment_mask(&concat_latent)?);
            concat_latents.push(concat_latent);

            vision_outputs.push(merge_for_segment(clip_vision_outputs, i)?);
        }

        let positive = stack_conditioning(
            &positive_conds,
            &concat_latents,
            &masks,
            &vision_outputs,
            &self.policies,
        )?;
        let negative = stack_conditioning(
            &negative_conds,
            &concat_latents,
            &masks,
            &vision_outputs,
            &self.policies,
        )?;

        Ok(EncodeOutput {
            positive,
            negative,
            latent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use std::cell::RefCell;

    /// Text encoder that records every prompt it sees.
    struct MockClip {
        calls: RefCell<Vec<String>>,
    }

    impl MockClip {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextEncoder for MockClip {
        fn encode(&self, text: &str) -> candle_core::Result<TextConditioning> {
            self.calls.borrow_mut().push(text.to_string());
            Ok(TextConditioning {
                embeddings: Tensor::zeros((1, 4, 8), DType::F32, &Device::Cpu)?,
                pooled_output: Some(Tensor::zeros((1, 8), DType::F32, &Device::Cpu)?),
            })
        }
    }

    /// VAE with a compression factor of 8 and a 4x temporal grouping.
    struct MockVae;

    impl VisualEncoder for MockVae {
        fn spacial_compression_encode(&self) -> usize {
            8
        }

        fn latent_channels(&self) -> usize {
            16
        }

        fn encode(&self, images: &Tensor) -> candle_core::Result<Tensor> {
            let (t, h, w, _) = images.dims4()?;
            Tensor::zeros(
                (1, 16, (t - 1) / 4 + 1, h / 8, w / 8),
                DType::F32,
                images.device(),
            )
        }
    }

    fn keyframes(n: usize) -> Tensor {
        Tensor::zeros((n, 16, 16, 3), DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn output_shapes_cover_all_segments() {
        let node = KeyframeToVideo::new(16, 16, 16, 1);
        let out = node
            .encode(&MockClip::new(), &MockVae, "[0] A", "neg", &keyframes(3), None)
            .unwrap();

        // fps 16, 1 second -> 17 frames -> 5 latent time steps, 2 segments.
        assert_eq!(out.latent.dims(), &[2, 16, 5, 2, 2]);

        let positive = &out.positive[0];
        assert_eq!(positive.embeddings.dims(), &[2, 4, 8]);
        assert_eq!(
            positive.extras.pooled_output.as_ref().unwrap().dims(),
            &[2, 8]
        );
        assert_eq!(
            positive.extras.concat_latent_image.as_ref().unwrap().dims(),
            &[2, 16, 5, 2, 2]
        );
        assert_eq!(
            positive.extras.concat_mask.as_ref().unwrap().dims(),
            &[2, 4, 5, 2, 2]
        );
        assert!(positive.extras.clip_vision_output.is_none());

        let negative = &out.negative[0];
        assert_eq!(negative.embeddings.dims(), &[2, 4, 8]);
    }

    #[test]
    fn segments_use_their_indexed_prompts() {
        let clip = MockClip::new();
        let node = KeyframeToVideo::new(16, 16, 16, 1);
        node.encode(&clip, &MockVae, "[0] meadow\n[1] forest", "neg", &keyframes(3), None)
            .unwrap();

        let calls = clip.calls.borrow();
        assert_eq!(calls.as_slice(), ["meadow", "neg", "forest", "neg"]);
    }

    #[test]
    fn too_few_keyframes_aborts() {
        let node = KeyframeToVideo::new(16, 16, 16, 1);
        let err = node
            .encode(&MockClip::new(), &MockVae, "p", "n", &keyframes(1), None)
            .unwrap_err();
        assert!(matches!(err, ConditioningError::TooFewKeyframes { got: 1 }));
    }

    #[test]
    fn vision_records_merge_and_stack() {
        let vision: Vec<ClipVisionOutput> = (0..3)
            .map(|_| ClipVisionOutput {
                penultimate_hidden_states: Tensor::zeros((1, 2, 8), DType::F32, &Device::Cpu)
                    .unwrap(),
            })
            .collect();

        let node = KeyframeToVideo::new(16, 16, 16, 1);
        let out = node
            .encode(
                &MockClip::new(),
                &MockVae,
                "p",
                "n",
                &keyframes(3),
                Some(&vision),
            )
            .unwrap();

        // Each segment merges two 2-token records; two segments stack.
        let cv = out.positive[0].extras.clip_vision_output.as_ref().unwrap();
        assert_eq!(cv.penultimate_hidden_states.dims(), &[2, 4, 8]);
    }

    #[test]
    fn single_image_input_is_rejected_not_crashed() {
        let node = KeyframeToVideo::new(16, 16, 16, 1);
        let img = Tensor::zeros((16, 16, 3), DType::F32, &Device::Cpu).unwrap();
        let err = node
            .encode(&MockClip::new(), &MockVae, "p", "n", &img, None)
            .unwrap_err();
        assert!(matches!(err, ConditioningError::TooFewKeyframes { got: 1 }));
    }
}

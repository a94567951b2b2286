//! Keyframe-to-video conditioning assembly for diffusion video models.
//!
//! Turns an ordered batch of keyframe images plus per-segment text prompts
//! into the conditioning and latent structures the video model expects:
//! one segment per consecutive keyframe pair, each anchored at its start and
//! end frames through the VAE's concat-latent/mask channel. The text
//! encoder, VAE, and vision encoder are host-provided collaborators behind
//! traits; this crate only does the shape bookkeeping around them.

use thiserror::Error;

mod assembler;
mod host;
mod keyframes;
mod prompt;
mod segment;
mod stack;
mod vision;

pub use assembler::{EncodeOutput, KeyframeToVideo};
pub use host::{ClipVisionOutput, TextConditioning, TextEncoder, VisualEncoder};
pub use keyframes::{ensure_batch, KeyframePairs};
pub use prompt::PromptIndex;
pub use segment::{segment_frames, segment_mask, video_length};
pub use stack::{
    stack_batch, stack_conditioning, ConditioningEntry, ConditioningExtras, MismatchPolicy,
    StackPolicies,
};
pub use vision::merge_for_segment;

#[derive(Debug, Error)]
pub enum ConditioningError {
    #[error("at least 2 keyframes are required to create video segments (got {got})")]
    TooFewKeyframes { got: usize },
    #[error("keyframe batch must be [N, H, W, 3] or [H, W, 3], got {dims:?}")]
    BadKeyframeShape { dims: Vec<usize> },
    #[error("cannot stack {what}: expected per-entry shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("frame buffer does not match a {width}x{height} RGB layout")]
    FrameLayout { width: u32, height: u32 },
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

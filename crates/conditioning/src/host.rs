//! Host-boundary collaborators.
//!
//! The diffusion host supplies the CLIP text encoder, the VAE, and the CLIP
//! vision side channel. They are opaque here: only their shape contracts
//! matter. All calls are synchronous and blocking; a failure in any of them
//! aborts the whole assembly.

use candle_core::Tensor;

/// Result of encoding one prompt string: a token-level embedding plus the
/// optional fixed-size pooled summary that accompanies it.
#[derive(Debug, Clone)]
pub struct TextConditioning {
    /// Token embeddings, `[1, tokens, dim]`.
    pub embeddings: Tensor,
    /// Pooled summary embedding, `[1, dim]`, when the encoder produces one.
    pub pooled_output: Option<Tensor>,
}

/// Host text encoder (CLIP).
pub trait TextEncoder {
    fn encode(&self, text: &str) -> candle_core::Result<TextConditioning>;
}

/// Host visual encoder (VAE).
pub trait VisualEncoder {
    /// Integer ratio between pixel-space and latent-space spatial resolution.
    fn spacial_compression_encode(&self) -> usize;

    /// Number of channels in the latent space.
    fn latent_channels(&self) -> usize;

    /// Encode a `[T, H, W, 3]` image sequence in `[0, 1]` into a latent
    /// `[1, latent_channels, T', H/scale, W/scale]`.
    fn encode(&self, images: &Tensor) -> candle_core::Result<Tensor>;
}

/// Per-keyframe output of the host's CLIP vision encoder.
#[derive(Debug, Clone)]
pub struct ClipVisionOutput {
    /// Second-to-last layer token embeddings, `[1, tokens, dim]`.
    pub penultimate_hidden_states: Tensor,
}

//! Batched stacking of per-segment conditioning records.
//!
//! Each field carries its own shape-mismatch policy. The defaults mirror
//! the host's behavior: pooled outputs drop individual incompatible
//! entries, everything else falls back to the first entry wholesale. The
//! asymmetry is deliberate and kept independently configurable.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::host::{ClipVisionOutput, TextConditioning};
use crate::ConditioningError;

/// What to do when per-segment tensors disagree on their non-batch shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Surface the mismatch as an error.
    AbortOnMismatch,
    /// Drop the incompatible entries and stack the rest.
    DropMismatched,
    /// Abandon stacking and use the first entry alone.
    FallbackToFirst,
}

/// Per-field mismatch policies for one stacking pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StackPolicies {
    pub embeddings: MismatchPolicy,
    pub pooled: MismatchPolicy,
    pub latents: MismatchPolicy,
    pub masks: MismatchPolicy,
    pub vision: MismatchPolicy,
}

impl Default for StackPolicies {
    fn default() -> Self {
        Self {
            embeddings: MismatchPolicy::FallbackToFirst,
            pooled: MismatchPolicy::DropMismatched,
            latents: MismatchPolicy::FallbackToFirst,
            masks: MismatchPolicy::FallbackToFirst,
            vision: MismatchPolicy::FallbackToFirst,
        }
    }
}

/// Auxiliary tensors attached to a stacked embedding, whichever were
/// successfully produced.
#[derive(Debug, Clone, Default)]
pub struct ConditioningExtras {
    pub pooled_output: Option<Tensor>,
    pub concat_latent_image: Option<Tensor>,
    pub concat_mask: Option<Tensor>,
    pub clip_vision_output: Option<ClipVisionOutput>,
}

/// One entry of the host's conditioning list format.
#[derive(Debug, Clone)]
pub struct ConditioningEntry {
    pub embeddings: Tensor,
    pub extras: ConditioningExtras,
}

/// Concatenate tensors along the batch axis under a mismatch policy.
///
/// Compatibility is judged against the first entry's non-batch shape.
/// Returns `None` for an empty input.
pub fn stack_batch(
    what: &'static str,
    tensors: &[Tensor],
    policy: MismatchPolicy,
) -> Result<Option<Tensor>, ConditioningError> {
    let Some(first) = tensors.first() else {
        return Ok(None);
    };
    let expected = &first.dims()[1..];

    let compatible = |t: &Tensor| t.rank() == first.rank() && &t.dims()[1..] == expected;

    if tensors.iter().all(|t| compatible(t)) {
        let refs: Vec<&Tensor> = tensors.iter().collect();
        return Ok(Some(Tensor::cat(&refs, 0)?));
    }

    match policy {
        MismatchPolicy::AbortOnMismatch => {
            let bad = tensors
                .iter()
                .find(|t| !compatible(t.as_ref()))
                .map(|t| t.dims().to_vec())
                .unwrap_or_default();
            Err(ConditioningError::ShapeMismatch {
                what,
                expected: expected.to_vec(),
                got: bad,
            })
        }
        MismatchPolicy::DropMismatched => {
            let mut kept: Vec<&Tensor> = Vec::with_capacity(tensors.len());
            for t in tensors {
                if compatible(t) {
                    kept.push(t);
                } else {
                    warn!(
                        what,
                        got = ?t.dims(),
                        expected = ?expected,
                        "skipping entry with incompatible shape"
                    );
                }
            }
            Ok(Some(Tensor::cat(&kept, 0)?))
        }
        MismatchPolicy::FallbackToFirst => {
            warn!(what, "could not stack entries, falling back to the first");
            Ok(Some(first.clone()))
        }
    }
}

/// Stack all per-segment records into a single-element conditioning list.
///
/// Segments without a pooled output or vision record are excluded from
/// those fields before concatenation. An empty record list yields an empty
/// conditioning list.
pub fn stack_conditioning(
    cond: &[TextConditioning],
    latents: &[Tensor],
    masks: &[Tensor],
    vision: &[Option<ClipVisionOutput>],
    policies: &StackPolicies,
) -> Result<Vec<ConditioningEntry>, ConditioningError> {
    let embeddings: Vec<Tensor> = cond.iter().map(|c| c.embeddings.clone()).collect();
    let Some(embeddings) = stack_batch("text embeddings", &embeddings, policies.embeddings)?
    else {
        return Ok(Vec::new());
    };

    let mut extras = ConditioningExtras::default();

    let pooled: Vec<Tensor> = cond.iter().filter_map(|c| c.pooled_output.clone()).collect();
    extras.pooled_output = stack_batch("pooled outputs", &pooled, policies.pooled)?;

    extras.concat_latent_image = stack_batch("concat latent images", latents, policies.latents)?;
    extras.concat_mask = stack_batch("concat masks", masks, policies.masks)?;

    let states: Vec<Tensor> = vision
        .iter()
        .filter_map(|v| v.as_ref().map(|v| v.penultimate_hidden_states.clone()))
        .collect();
    extras.clip_vision_output = stack_batch("clip vision outputs", &states, policies.vision)?
        .map(|states| ClipVisionOutput {
            penultimate_hidden_states: states,
        });

    Ok(vec![ConditioningEntry { embeddings, extras }])
}

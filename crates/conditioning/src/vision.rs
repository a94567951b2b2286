//! Merging of per-keyframe CLIP vision outputs into per-segment records.

use crate::host::ClipVisionOutput;
use crate::segment::cat_tokens;

/// Resolve the vision record for segment i from a per-keyframe sequence.
///
/// The start side is element i, the end side element i+1, either of which
/// may be out of range. Both present: their penultimate hidden states are
/// concatenated along the token axis into a fresh record. One present: it
/// is used alone. Neither: the segment carries no vision record.
pub fn merge_for_segment(
    outputs: Option<&[ClipVisionOutput]>,
    segment: usize,
) -> candle_core::Result<Option<ClipVisionOutput>> {
    let Some(outputs) = outputs else {
        return Ok(None);
    };
    let start = outputs.get(segment);
    let end = outputs.get(segment + 1);
    match (start, end) {
        (Some(s), Some(e)) => {
            let states = cat_tokens(&s.penultimate_hidden_states, &e.penultimate_hidden_states)?;
            Ok(Some(ClipVisionOutput {
                penultimate_hidden_states: states,
            }))
        }
        (Some(s), None) => Ok(Some(s.clone())),
        (None, Some(e)) => Ok(Some(e.clone())),
        (None, None) => Ok(None),
    }
}

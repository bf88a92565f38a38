//! Expression retargeter — smoothed morph-influence updates.
//!
//! Each tick, every detected score is absorbed into its registered channels
//! by linear interpolation. Channels whose name is absent from the current
//! tick keep their last smoothed value: the model's blendshape list may
//! reorder or shrink tick to tick, and resetting on absence would flicker.
//! Holding is therefore the contract, not a leak.

use crate::index::MorphTargetIndex;
use crate::scene::AvatarScene;
use crate::types::NamedScore;

/// What to do with channel values while no face is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPolicy {
    /// Keep the last smoothed values indefinitely (default; avoids flicker
    /// on transient detection loss).
    Hold,
    /// After this many consecutive zero-face ticks, start easing all
    /// channels back toward neutral.
    DecayAfter { missed_ticks: u32 },
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self::Hold
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Absorb one tick's scores into the scene's morph influences.
///
/// `smoothing` in (0, 1] is the fraction of the new reading absorbed per
/// tick. It is deliberately tick-rate dependent: the driver runs at a fixed
/// target rate, so a fixed factor gives a fixed settle time.
///
/// Unknown names are skipped silently — partial coverage between the model
/// vocabulary and the avatar's channels is expected. The caller must not
/// invoke this on a zero-face tick; skipping the call is what implements
/// the hold policy.
pub fn apply_expression(
    scene: &mut AvatarScene,
    index: &MorphTargetIndex,
    scores: &[NamedScore],
    smoothing: f32,
) {
    for named in scores {
        let Some(channels) = index.lookup(&named.name) else {
            continue;
        };
        for ch in channels {
            let mesh = &mut scene.meshes[ch.mesh];
            let v = &mut mesh.influences[ch.channel];
            *v = lerp(*v, named.score, smoothing);
        }
    }
}

/// Ease every morph influence toward neutral (zero).
///
/// Only invoked by drivers configured with [`HoldPolicy::DecayAfter`] once
/// the missed-tick threshold is crossed.
pub fn decay_to_neutral(scene: &mut AvatarScene, smoothing: f32) {
    for mesh in &mut scene.meshes {
        for v in &mut mesh.influences {
            *v = lerp(*v, 0.0, smoothing);
        }
    }
}

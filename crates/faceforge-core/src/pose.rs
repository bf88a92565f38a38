//! Pose retargeter — smoothed head orientation from a facial transform.
//!
//! Only the rotation component of the detected transform drives the avatar:
//! head position and scale are fixed by scene layout, so translation and
//! scale from the matrix are discarded on purpose. Do not "fix" this.

use crate::scene::HeadNode;
use glam::{Mat4, Quat};

/// Spherically interpolate the head toward the detected orientation.
///
/// A missing transform or one that is not exactly 16 elements is treated as
/// an absent pose and skipped — malformed input is recovered, not an error.
/// `smoothing` in (0, 1] is the per-tick interpolation factor.
pub fn apply_pose(head: &mut HeadNode, transform: Option<&[f32]>, smoothing: f32) {
    let Some(rotation) = decompose_rotation(transform) else {
        return;
    };
    head.orientation = head.orientation.slerp(rotation, smoothing);
}

/// Extract the unit rotation quaternion from a column-major 4x4 transform.
///
/// Returns `None` for absent/malformed input and for degenerate matrices
/// whose decomposition is not finite (zero scale collapses an axis).
fn decompose_rotation(transform: Option<&[f32]>) -> Option<Quat> {
    let m = transform?;
    let cols: &[f32; 16] = m.try_into().ok()?;
    let mat = Mat4::from_cols_array(cols);
    let (_scale, rotation, _translation) = mat.to_scale_rotation_translation();
    if rotation.is_finite() && rotation.length_squared() > 0.0 {
        Some(rotation)
    } else {
        None
    }
}

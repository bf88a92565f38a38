//! faceforge-core — Blendshape retargeting engine.
//!
//! Maps per-frame named blendshape scores and a facial transform matrix
//! onto an avatar's morph-target influences and head orientation, with
//! per-tick exponential smoothing.

pub mod expression;
pub mod index;
pub mod pose;
pub mod scene;
pub mod types;

pub use expression::HoldPolicy;
pub use index::{canonical_key, MorphChannel, MorphTargetIndex};
pub use scene::{AvatarScene, HeadNode, MorphMesh, SceneError};
pub use types::{Detection, NamedScore};

//! faceforge-tracker — face blendshape inference and the animation driver.
//!
//! Wraps an ONNX face-landmarker model (blendshape scores + facial
//! transform matrix) behind the [`FaceTracker`] trait and drives the
//! per-tick retargeting loop against an avatar scene.

pub mod blendshapes;
pub mod driver;
pub mod landmarker;
pub mod source;

pub use driver::{
    spawn_driver, AnimationDriver, CaptureData, DriverConfig, DriverError, DriverHandle,
    DriverSnapshot, DriverState, FaceTracker,
};
pub use landmarker::{Landmarker, LandmarkerError};
pub use source::VideoSource;

//! faceforge-camera — V4L2 webcam capture.
//!
//! Thin hardware layer: opens a capture device, negotiates a pixel format,
//! and hands out grayscale frames tagged with the driver's sequence number
//! (the presentation stamp the animation driver de-duplicates on).

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use frame::{Frame, FrameError};

//! Video source seam for the animation driver.

use faceforge_camera::{Camera, CameraError, Frame};

/// Provides the current video frame, or `None` while the source is not yet
/// delivering (device warming up). Frames carry a sequence number the
/// driver de-duplicates on.
pub trait VideoSource {
    fn current_frame(&mut self) -> Result<Option<Frame>, CameraError>;
}

impl VideoSource for Camera {
    fn current_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        self.capture_frame().map(Some)
    }
}

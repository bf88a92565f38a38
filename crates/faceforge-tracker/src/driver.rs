//! Animation driver — the per-tick retargeting loop.
//!
//! Owns the avatar scene and morph index for the avatar's lifetime and
//! runs a fixed-cadence tick loop on a dedicated thread: fetch the current
//! frame, de-duplicate on its sequence stamp, run inference, retarget.
//! Control traffic (status snapshots, frame capture for analysis,
//! shutdown) reaches the loop through a message channel, the same
//! request/reply pattern used for the camera engine this grew out of.

use crate::landmarker::LandmarkerError;
use crate::source::VideoSource;
use faceforge_camera::Frame;
use faceforge_core::expression::{apply_expression, decay_to_neutral, HoldPolicy};
use faceforge_core::pose::apply_pose;
use faceforge_core::{AvatarScene, Detection, MorphTargetIndex, NamedScore};
use glam::Quat;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("driver thread exited")]
    ChannelClosed,
}

/// Inference capability consumed by the driver: one frame in, zero-or-one
/// face's detection out.
pub trait FaceTracker {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<Option<Detection>, LandmarkerError>;
}

/// Driver lifecycle. `ModelLoading` and `Error` cover the load phase:
/// construction requires a loaded tracker, so a failed load never produces
/// a driver — the caller surfaces the terminal `Error` state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    ModelLoading,
    /// Model loaded, waiting for the first ready video frame.
    Idle,
    Tracking,
    /// Terminal; no automatic retry.
    Error,
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::ModelLoading => "loading model",
            Self::Idle => "idle",
            Self::Tracking => "tracking",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Fraction of a new blendshape reading absorbed per tick, in (0, 1].
    pub expression_smoothing: f32,
    /// Slerp factor toward the detected head orientation per tick, in (0, 1].
    pub pose_smoothing: f32,
    /// Tick cadence. Stands in for the display's paint cadence; smoothing
    /// factors are calibrated against it.
    pub tick_rate_hz: u32,
    pub hold_policy: HoldPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            expression_smoothing: 0.5,
            pose_smoothing: 0.3,
            tick_rate_hz: 60,
            hold_policy: HoldPolicy::Hold,
        }
    }
}

/// Point-in-time driver status for display.
#[derive(Debug, Clone)]
pub struct DriverSnapshot {
    pub state: DriverState,
    pub top_scores: Vec<NamedScore>,
    pub head_orientation: Quat,
    pub ticks: u64,
    pub inferences: u64,
}

/// Latest frame plus its top scores, for the cloud analysis path.
#[derive(Clone)]
pub struct CaptureData {
    pub frame: Frame,
    pub scores: Vec<NamedScore>,
}

enum DriverRequest {
    Snapshot {
        reply: oneshot::Sender<DriverSnapshot>,
    },
    Capture {
        reply: oneshot::Sender<Option<CaptureData>>,
    },
    Shutdown,
}

/// Clone-safe handle to the driver thread.
#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<DriverRequest>,
}

impl DriverHandle {
    pub async fn snapshot(&self) -> Result<DriverSnapshot, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DriverRequest::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| DriverError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DriverError::ChannelClosed)
    }

    /// Latest frame and scores, `None` until the first frame arrives.
    pub async fn capture(&self) -> Result<Option<CaptureData>, DriverError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(DriverRequest::Capture { reply: reply_tx })
            .await
            .map_err(|_| DriverError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DriverError::ChannelClosed)
    }

    /// Stop the loop. No further tick runs after this is processed; an
    /// inference already in flight completes and its result is discarded
    /// with the driver.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(DriverRequest::Shutdown).await;
    }
}

/// The retargeting loop body, generic over its seams for deterministic
/// tests. The async layer around it never touches scene state.
pub struct AnimationDriver<S, T> {
    source: S,
    tracker: T,
    scene: AvatarScene,
    index: MorphTargetIndex,
    config: DriverConfig,
    state: DriverState,
    started: Instant,
    last_sequence: Option<u32>,
    missed_ticks: u32,
    last_frame: Option<Frame>,
    last_detection: Option<Detection>,
    ticks: u64,
    inferences: u64,
}

impl<S: VideoSource, T: FaceTracker> AnimationDriver<S, T> {
    /// Build a driver for a loaded tracker and avatar. The morph index is
    /// built here, before any tick can observe the scene.
    pub fn new(source: S, tracker: T, scene: AvatarScene, config: DriverConfig) -> Self {
        let index = MorphTargetIndex::build(&scene);
        Self {
            source,
            tracker,
            scene,
            index,
            config,
            state: DriverState::Idle,
            started: Instant::now(),
            last_sequence: None,
            missed_ticks: 0,
            last_frame: None,
            last_detection: None,
            ticks: 0,
            inferences: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn scene(&self) -> &AvatarScene {
        &self.scene
    }

    /// One tick: frame fetch, de-dup, inference, retarget.
    ///
    /// Nothing in here propagates an error upward — a bad frame or a failed
    /// inference call is logged and the loop carries on. Only shutdown
    /// stops ticking.
    pub fn tick(&mut self) {
        self.ticks += 1;

        let frame = match self.source.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "frame fetch failed; will retry next tick");
                return;
            }
        };

        if self.state == DriverState::Idle {
            self.state = DriverState::Tracking;
            tracing::info!("video ready, tracking started");
        }

        // Never run inference twice on the same frame: the tick cadence can
        // outpace video frame delivery.
        if self.last_sequence == Some(frame.sequence) {
            return;
        }
        self.last_sequence = Some(frame.sequence);

        let timestamp_ms = self.started.elapsed().as_millis() as u64;
        let detection = match self.tracker.detect(&frame, timestamp_ms) {
            Ok(d) => d,
            Err(e) => {
                // One bad frame must not kill tracking.
                tracing::warn!(error = %e, "inference failed; continuing");
                self.last_frame = Some(frame);
                return;
            }
        };
        self.inferences += 1;
        self.last_frame = Some(frame);

        match detection {
            Some(det) if !det.scores.is_empty() => {
                self.missed_ticks = 0;
                apply_expression(
                    &mut self.scene,
                    &self.index,
                    &det.scores,
                    self.config.expression_smoothing,
                );
                apply_pose(
                    &mut self.scene.head,
                    det.transform.as_deref(),
                    self.config.pose_smoothing,
                );
                self.last_detection = Some(det);
            }
            _ => {
                // Zero faces: hold the last smoothed values. Decaying on
                // transient loss flickers; opting in to decay is a config
                // choice, not the default.
                self.missed_ticks = self.missed_ticks.saturating_add(1);
                if let HoldPolicy::DecayAfter { missed_ticks } = self.config.hold_policy {
                    if self.missed_ticks > missed_ticks {
                        decay_to_neutral(&mut self.scene, self.config.expression_smoothing);
                    }
                }
            }
        }
    }

    fn snapshot(&self) -> DriverSnapshot {
        let top_scores = self
            .last_detection
            .as_ref()
            .map(|d| d.top_scores(5).into_iter().cloned().collect())
            .unwrap_or_default();
        DriverSnapshot {
            state: self.state,
            top_scores,
            head_orientation: self.scene.head.orientation,
            ticks: self.ticks,
            inferences: self.inferences,
        }
    }

    fn capture_data(&self) -> Option<CaptureData> {
        let frame = self.last_frame.clone()?;
        let scores = self
            .last_detection
            .as_ref()
            .map(|d| d.scores.clone())
            .unwrap_or_default();
        Some(CaptureData { frame, scores })
    }
}

/// Spawn the driver loop on a dedicated OS thread.
///
/// The thread ticks at the configured cadence, draining control requests
/// between ticks. It exits when a shutdown request arrives or every handle
/// is dropped; either way no further tick is scheduled.
pub fn spawn_driver<S, T>(mut driver: AnimationDriver<S, T>) -> DriverHandle
where
    S: VideoSource + Send + 'static,
    T: FaceTracker + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<DriverRequest>(4);
    let tick_period = Duration::from_secs_f64(1.0 / driver.config.tick_rate_hz.max(1) as f64);

    std::thread::Builder::new()
        .name("faceforge-driver".into())
        .spawn(move || {
            tracing::info!(period_ms = tick_period.as_millis() as u64, "driver thread started");
            loop {
                let tick_start = Instant::now();

                // Control first, so shutdown wins over the next tick.
                loop {
                    match rx.try_recv() {
                        Ok(DriverRequest::Snapshot { reply }) => {
                            let _ = reply.send(driver.snapshot());
                        }
                        Ok(DriverRequest::Capture { reply }) => {
                            let _ = reply.send(driver.capture_data());
                        }
                        Ok(DriverRequest::Shutdown) => {
                            tracing::info!("driver shutdown requested");
                            return;
                        }
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            tracing::info!("all driver handles dropped; stopping");
                            return;
                        }
                    }
                }

                driver.tick();

                if let Some(remaining) = tick_period.checked_sub(tick_start.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        })
        .expect("failed to spawn driver thread");

    DriverHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faceforge_camera::CameraError;
    use faceforge_core::MorphMesh;
    use std::collections::HashMap;

    fn test_frame(sequence: u32) -> Frame {
        Frame {
            data: vec![128; 16],
            width: 4,
            height: 4,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Source that yields frames with preset sequence numbers.
    struct FakeSource {
        sequences: Vec<u32>,
        cursor: usize,
    }

    impl FakeSource {
        fn new(sequences: Vec<u32>) -> Self {
            Self { sequences, cursor: 0 }
        }
    }

    impl VideoSource for FakeSource {
        fn current_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            let seq = self
                .sequences
                .get(self.cursor)
                .copied()
                .or_else(|| self.sequences.last().copied());
            self.cursor += 1;
            Ok(seq.map(test_frame))
        }
    }

    /// Tracker that replays canned results and counts invocations.
    struct FakeTracker {
        results: Vec<Result<Option<Detection>, LandmarkerError>>,
        cursor: usize,
        calls: u64,
    }

    impl FakeTracker {
        fn always(detection: Option<Detection>) -> Self {
            Self {
                results: vec![Ok(detection)],
                cursor: 0,
                calls: 0,
            }
        }

        fn sequence(results: Vec<Result<Option<Detection>, LandmarkerError>>) -> Self {
            Self {
                results,
                cursor: 0,
                calls: 0,
            }
        }
    }

    impl FaceTracker for FakeTracker {
        fn detect(
            &mut self,
            _frame: &Frame,
            _timestamp_ms: u64,
        ) -> Result<Option<Detection>, LandmarkerError> {
            self.calls += 1;
            let idx = self.cursor.min(self.results.len() - 1);
            self.cursor += 1;
            match &self.results[idx] {
                Ok(d) => Ok(d.clone()),
                Err(_) => Err(LandmarkerError::InferenceFailed("canned failure".into())),
            }
        }
    }

    fn smile_scene() -> AvatarScene {
        let mut dict = HashMap::new();
        dict.insert("smile".to_string(), 0usize);
        AvatarScene::new(vec![MorphMesh::new("face".into(), dict).unwrap()])
    }

    fn smile_detection(score: f32) -> Detection {
        Detection {
            scores: vec![NamedScore::new("smile", score)],
            transform: None,
        }
    }

    fn driver_with(
        sequences: Vec<u32>,
        tracker: FakeTracker,
        config: DriverConfig,
    ) -> AnimationDriver<FakeSource, FakeTracker> {
        AnimationDriver::new(FakeSource::new(sequences), tracker, smile_scene(), config)
    }

    #[test]
    fn test_idle_to_tracking_on_first_frame() {
        let mut driver = driver_with(
            vec![1],
            FakeTracker::always(Some(smile_detection(1.0))),
            DriverConfig::default(),
        );
        assert_eq!(driver.state(), DriverState::Idle);
        driver.tick();
        assert_eq!(driver.state(), DriverState::Tracking);
    }

    #[test]
    fn test_end_to_end_smoothing() {
        // smoothing 0.5, score 1.0: 0 → 0.5 → 0.75
        let mut driver = driver_with(
            vec![1, 2],
            FakeTracker::always(Some(smile_detection(1.0))),
            DriverConfig::default(),
        );
        driver.tick();
        assert!((driver.scene().meshes[0].influences[0] - 0.5).abs() < 1e-6);
        driver.tick();
        assert!((driver.scene().meshes[0].influences[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_frame_dedup_runs_inference_once() {
        // Two ticks, unchanged sequence stamp → exactly one inference.
        let mut driver = driver_with(
            vec![7, 7],
            FakeTracker::always(Some(smile_detection(1.0))),
            DriverConfig::default(),
        );
        driver.tick();
        driver.tick();
        assert_eq!(driver.tracker.calls, 1);
    }

    #[test]
    fn test_inference_error_does_not_stop_loop() {
        let mut driver = driver_with(
            vec![1, 2, 3],
            FakeTracker::sequence(vec![
                Err(LandmarkerError::InferenceFailed("boom".into())),
                Ok(Some(smile_detection(1.0))),
            ]),
            DriverConfig::default(),
        );
        driver.tick(); // fails, caught
        driver.tick(); // succeeds
        assert!((driver.scene().meshes[0].influences[0] - 0.5).abs() < 1e-6);
        assert_eq!(driver.tracker.calls, 2);
    }

    #[test]
    fn test_zero_face_holds_state() {
        let mut driver = driver_with(
            vec![1, 2, 3, 4, 5],
            FakeTracker::sequence(vec![Ok(Some(smile_detection(1.0))), Ok(None)]),
            DriverConfig {
                expression_smoothing: 1.0,
                ..DriverConfig::default()
            },
        );
        driver.tick();
        assert_eq!(driver.scene().meshes[0].influences[0], 1.0);
        let orientation_before = driver.scene().head.orientation;

        // N consecutive zero-face ticks: values and orientation unchanged.
        for _ in 0..4 {
            driver.tick();
        }
        assert_eq!(driver.scene().meshes[0].influences[0], 1.0);
        assert_eq!(driver.scene().head.orientation, orientation_before);
    }

    #[test]
    fn test_decay_policy_returns_to_neutral() {
        let mut driver = driver_with(
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            FakeTracker::sequence(vec![Ok(Some(smile_detection(1.0))), Ok(None)]),
            DriverConfig {
                expression_smoothing: 1.0,
                hold_policy: HoldPolicy::DecayAfter { missed_ticks: 2 },
                ..DriverConfig::default()
            },
        );
        driver.tick();
        assert_eq!(driver.scene().meshes[0].influences[0], 1.0);

        // First two missed ticks hold...
        driver.tick();
        driver.tick();
        assert_eq!(driver.scene().meshes[0].influences[0], 1.0);
        // ...then decay kicks in (smoothing 1.0 drops straight to zero).
        driver.tick();
        assert_eq!(driver.scene().meshes[0].influences[0], 0.0);
    }

    #[test]
    fn test_pose_applied_from_detection() {
        let target = Quat::from_rotation_y(0.6);
        let det = Detection {
            scores: vec![NamedScore::new("smile", 0.2)],
            transform: Some(glam::Mat4::from_quat(target).to_cols_array().to_vec()),
        };
        let mut driver = driver_with(
            vec![1],
            FakeTracker::always(Some(det)),
            DriverConfig {
                pose_smoothing: 1.0,
                ..DriverConfig::default()
            },
        );
        driver.tick();
        assert!(driver.scene().head.orientation.angle_between(target) < 1e-5);
    }

    #[test]
    fn test_malformed_transform_leaves_orientation() {
        let det = Detection {
            scores: vec![NamedScore::new("smile", 0.2)],
            transform: Some(vec![1.0; 9]),
        };
        let mut driver = driver_with(
            vec![1],
            FakeTracker::always(Some(det)),
            DriverConfig {
                pose_smoothing: 1.0,
                ..DriverConfig::default()
            },
        );
        driver.tick();
        assert_eq!(driver.scene().head.orientation, Quat::IDENTITY);
    }

    #[tokio::test]
    async fn test_spawned_driver_snapshot_and_shutdown() {
        let driver = driver_with(
            (1..1000).collect(),
            FakeTracker::always(Some(smile_detection(0.9))),
            DriverConfig {
                tick_rate_hz: 200,
                ..DriverConfig::default()
            },
        );
        let handle = spawn_driver(driver);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.state, DriverState::Tracking);
        assert!(snap.ticks > 0);
        assert_eq!(snap.top_scores[0].name, "smile");

        let capture = handle.capture().await.unwrap();
        assert!(capture.is_some());

        handle.shutdown().await;
        // After shutdown the loop must be gone; requests fail cleanly.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.snapshot().await.is_err());
    }
}

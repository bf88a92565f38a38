use faceforge_analysis::AnalysisConfig;
use faceforge_core::expression::HoldPolicy;
use faceforge_tracker::DriverConfig;
use std::path::PathBuf;

/// Application configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the face landmarker ONNX model.
    pub model_path: PathBuf,
    /// Path to the avatar manifest JSON.
    pub avatar_manifest: PathBuf,
    /// Fraction of a new blendshape reading absorbed per tick.
    pub expression_smoothing: f32,
    /// Slerp factor toward the detected head orientation per tick.
    pub pose_smoothing: f32,
    /// Tick cadence of the animation driver.
    pub tick_rate_hz: u32,
    /// Zero keeps the hold-forever default; a positive value switches to
    /// decay-to-neutral after that many consecutive zero-face ticks.
    pub decay_after_missed_ticks: u32,
    /// Credential for the cloud analysis call. May be empty: tracking works
    /// without analysis, and the analysis path fails fast on first use.
    pub api_key: String,
    /// Hosted model id for analysis requests.
    pub analysis_model: String,
}

impl Config {
    /// Load configuration from `FACEFORGE_*` environment variables with
    /// defaults. The analysis credential also honors `GEMINI_API_KEY`.
    pub fn from_env() -> Self {
        let model_path = std::env::var("FACEFORGE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models/face_landmarker.onnx"));

        let avatar_manifest = std::env::var("FACEFORGE_AVATAR_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models/avatar.json"));

        let api_key = std::env::var("FACEFORGE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .unwrap_or_default();

        Self {
            camera_device: std::env::var("FACEFORGE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_path,
            avatar_manifest,
            expression_smoothing: env_f32("FACEFORGE_EXPRESSION_SMOOTHING", 0.5),
            pose_smoothing: env_f32("FACEFORGE_POSE_SMOOTHING", 0.3),
            tick_rate_hz: env_u32("FACEFORGE_TICK_RATE_HZ", 60),
            decay_after_missed_ticks: env_u32("FACEFORGE_DECAY_AFTER_TICKS", 0),
            api_key,
            analysis_model: std::env::var("FACEFORGE_ANALYSIS_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        let hold_policy = if self.decay_after_missed_ticks == 0 {
            HoldPolicy::Hold
        } else {
            HoldPolicy::DecayAfter {
                missed_ticks: self.decay_after_missed_ticks,
            }
        };
        DriverConfig {
            expression_smoothing: self.expression_smoothing,
            pose_smoothing: self.pose_smoothing,
            tick_rate_hz: self.tick_rate_hz,
            hold_policy,
        }
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        let mut config = AnalysisConfig::new(self.api_key.clone());
        config.model = self.analysis_model.clone();
        config
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! ONNX face landmarker via ONNX Runtime.
//!
//! Runs a blendshape-output face model in video streaming mode: each call
//! takes one grayscale frame plus a monotonically increasing timestamp and
//! yields at most one face's named scores and facial transform matrix.

use crate::blendshapes::BLENDSHAPE_NAMES;
use crate::driver::FaceTracker;
use faceforge_camera::Frame;
use faceforge_core::{Detection, NamedScore};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const LANDMARKER_INPUT_SIZE: usize = 256;
const LANDMARKER_SCALE: f32 = 255.0;
const PRESENCE_THRESHOLD: f32 = 0.5;
const TRANSFORM_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum LandmarkerError {
    #[error("model file not found: {0} — place the face landmarker ONNX export in models/")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor slots: (scores_idx, transform_idx, presence_idx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputIndices {
    scores: usize,
    transform: Option<usize>,
    presence: Option<usize>,
}

/// ONNX-backed blendshape landmarker.
pub struct Landmarker {
    session: Session,
    output_indices: OutputIndices,
    last_timestamp_ms: Option<u64>,
}

impl Landmarker {
    /// Load the face landmarker ONNX model from the given path.
    ///
    /// Configured once at load: single-face, blendshape and transform
    /// outputs enabled by model export, backend selection left to ort's
    /// execution providers.
    pub fn load(model_path: &str) -> Result<Self, LandmarkerError> {
        if !Path::new(model_path).exists() {
            return Err(LandmarkerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face landmarker model"
        );

        if output_names.is_empty() {
            return Err(LandmarkerError::InferenceFailed(
                "model has no outputs".into(),
            ));
        }

        let output_indices = discover_output_indices(&output_names);
        tracing::debug!(?output_indices, "landmarker output tensor mapping");

        Ok(Self {
            session,
            output_indices,
            last_timestamp_ms: None,
        })
    }

    fn run_inference(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<Option<Detection>, LandmarkerError> {
        // Video streaming mode: timestamps must advance. A stale timestamp
        // means the caller failed to de-duplicate; skip rather than feed
        // the temporal filter garbage.
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms <= last {
                tracing::debug!(timestamp_ms, last, "non-advancing timestamp; skipping");
                return Ok(None);
            }
        }
        self.last_timestamp_ms = Some(timestamp_ms);

        let input = preprocess(&frame.data, frame.width as usize, frame.height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Face-presence gate (max faces = 1 by construction).
        if let Some(idx) = self.output_indices.presence {
            let (_, presence) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LandmarkerError::InferenceFailed(format!("presence: {e}")))?;
            let score = presence.first().copied().unwrap_or(0.0);
            if score < PRESENCE_THRESHOLD {
                return Ok(None);
            }
        }

        let (_, raw_scores) = outputs[self.output_indices.scores]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkerError::InferenceFailed(format!("blendshapes: {e}")))?;
        let scores = decode_scores(raw_scores)?;

        let transform = match self.output_indices.transform {
            Some(idx) => {
                let (_, raw) = outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| LandmarkerError::InferenceFailed(format!("transform: {e}")))?;
                extract_transform(raw)
            }
            None => None,
        };

        Ok(Some(Detection { scores, transform }))
    }
}

impl FaceTracker for Landmarker {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<Option<Detection>, LandmarkerError> {
        self.run_inference(frame, timestamp_ms)
    }
}

/// Discover output tensor ordering by name.
///
/// Landmarker exports name tensors along the lines of "blendshapes" /
/// "transform" / "presence", or use generic numeric names. When names are
/// not recognized, fall back to positional ordering:
///   [0] = blendshape scores, [1] = transform matrix, [2] = face presence.
fn discover_output_indices(names: &[String]) -> OutputIndices {
    let find = |keys: &[&str]| -> Option<usize> {
        names
            .iter()
            .position(|n| keys.iter().any(|k| n.to_lowercase().contains(k)))
    };

    let scores_by_name = find(&["blendshape", "score"]);
    if let Some(scores) = scores_by_name {
        tracing::info!("landmarker: using name-based output tensor mapping");
        OutputIndices {
            scores,
            transform: find(&["transform", "matrix"]),
            presence: find(&["presence", "flag", "confidence"]),
        }
    } else {
        tracing::info!(
            ?names,
            "landmarker: output names not recognized, using positional mapping \
             [0]=blendshapes, [1]=transform, [2]=presence"
        );
        OutputIndices {
            scores: 0,
            transform: (names.len() > 1).then_some(1),
            presence: (names.len() > 2).then_some(2),
        }
    }
}

/// Zip the raw score tensor with the blendshape vocabulary.
fn decode_scores(raw: &[f32]) -> Result<Vec<NamedScore>, LandmarkerError> {
    if raw.len() != BLENDSHAPE_NAMES.len() {
        return Err(LandmarkerError::InferenceFailed(format!(
            "expected {} blendshape scores, got {}",
            BLENDSHAPE_NAMES.len(),
            raw.len()
        )));
    }
    Ok(BLENDSHAPE_NAMES
        .iter()
        .zip(raw.iter())
        .map(|(&name, &score)| NamedScore::new(name, score.clamp(0.0, 1.0)))
        .collect())
}

/// Pass the 4x4 transform through when well-formed; malformed output is
/// treated as an absent pose downstream, not an error.
fn extract_transform(raw: &[f32]) -> Option<Vec<f32>> {
    if raw.len() == TRANSFORM_LEN {
        Some(raw.to_vec())
    } else {
        tracing::debug!(len = raw.len(), "transform output has wrong length; dropping");
        None
    }
}

/// Preprocess a grayscale frame into a NCHW float tensor with letterbox
/// padding at the model input size.
///
/// Bilinear resize preserves edge sharpness; the Y channel is replicated
/// into all three input channels and normalized to [0, 1].
fn preprocess(frame: &[u8], width: usize, height: usize) -> Array4<f32> {
    let input = LANDMARKER_INPUT_SIZE;

    let scale_w = input as f32 / width as f32;
    let scale_h = input as f32 / height as f32;
    let scale = scale_w.min(scale_h);

    let new_w = ((width as f32 * scale).round() as usize).max(1);
    let new_h = ((height as f32 * scale).round() as usize).max(1);
    let pad_x = (input - new_w) / 2;
    let pad_y = (input - new_h) / 2;

    // Bilinear resize of the grayscale frame.
    let inv_scale = 1.0 / scale;
    let mut resized = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = frame[y0 * width + x0] as f32;
            let tr = frame[y0 * width + x1] as f32;
            let bl = frame[y1 * width + x0] as f32;
            let br = frame[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    // NCHW tensor, padding left at 0.0; grayscale replicated into RGB.
    let mut tensor = Array4::<f32>::zeros((1, 3, input, input));
    for y in 0..new_h {
        for x in 0..new_w {
            let normalized = resized[y * new_w + x] as f32 / LANDMARKER_SCALE;
            let ty = y + pad_y;
            let tx = x + pad_x;
            tensor[[0, 0, ty, tx]] = normalized;
            tensor[[0, 1, ty, tx]] = normalized;
            tensor[[0, 2, ty, tx]] = normalized;
        }
    }

    tensor
}

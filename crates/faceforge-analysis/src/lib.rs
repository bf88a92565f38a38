//! faceforge-analysis — cloud expression analysis.
//!
//! Sends one captured frame plus a short summary of the strongest
//! blendshape scores to a hosted vision-language model and parses the
//! structured "acting analysis" it returns. One request in flight at a
//! time, no retries: a failure is surfaced once and the caller is
//! immediately ready to try again.

pub mod capture;
pub mod client;
pub mod prompt;
pub mod slot;

pub use capture::encode_jpeg;
pub use client::{AnalysisClient, AnalysisConfig, AnalysisError, AnalysisResult};
pub use prompt::summarize_top_scores;
pub use slot::{AnalysisGuard, AnalysisSlot};

//! Prompt construction for the expression-analysis request.

use faceforge_core::NamedScore;

/// Format the top-N scores by descending value as prompt context,
/// e.g. `"mouthSmileLeft: 82.3%, jawOpen: 41.0%"`.
pub fn summarize_top_scores(scores: &[NamedScore], n: usize) -> String {
    let mut sorted: Vec<&NamedScore> = scores.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
        .iter()
        .take(n)
        .map(|s| format!("{}: {:.1}%", s.name, s.score * 100.0))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The analysis prompt sent alongside the captured frame.
pub fn build_prompt(summary: &str) -> String {
    format!(
        "Analyze this facial expression from the user's webcam and the \
         accompanying blend shape data.\n\n\
         Top active blend shapes:\n{summary}\n\n\
         Provide a structured analysis of the expression:\n\
         1. Identify the primary emotion.\n\
         2. Describe the expression in detail (micro-expressions, nuance).\n\
         3. Give acting feedback/tips (e.g., \"Try raising your eyebrows \
         more for surprise\")."
    )
}

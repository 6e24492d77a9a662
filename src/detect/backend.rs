use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Backends wrap a pretrained model and are treated as a trusted oracle: the
/// pipeline never second-guesses boxes or scores beyond its own filtering.
/// Implementations must honour `max_candidates` and drop anything scoring
/// below `min_score`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(
        &mut self,
        frame: &Frame,
        max_candidates: usize,
        min_score: f32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once on the loader thread.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sorts by descending score, drops sub-threshold candidates and caps the list.
pub fn rank_candidates(
    mut candidates: Vec<Detection>,
    max_candidates: usize,
    min_score: f32,
) -> Vec<Detection> {
    candidates.retain(|d| d.score >= min_score);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(max_candidates);
    candidates
}

//! Session state container.
//!
//! `Controls` is written only by control handling and `Published` only by the
//! frame loop. The loop never reads `Controls` mid-cycle; it works from the
//! snapshot it captured at its last restart.

use std::collections::BTreeMap;

use crate::detect::Detection;
use crate::filter::FilterState;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Controls {
    pub detecting: bool,
    pub filter: FilterState,
}

#[derive(Clone, Debug, Default)]
pub struct Published {
    pub detections: Vec<Detection>,
    /// Mean of the FPS window; 0 until the first sample.
    pub fps: f64,
    /// Number of publishes so far.
    pub updates: u64,
}

impl Published {
    pub(crate) fn publish_detections(&mut self, detections: Vec<Detection>) {
        self.detections = detections;
        self.updates += 1;
    }
}

#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub controls: Controls,
    pub published: Published,
}

impl AppState {
    pub fn new(filter: FilterState) -> Self {
        Self {
            controls: Controls {
                detecting: false,
                filter,
            },
            published: Published::default(),
        }
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats::from(self.published.detections.as_slice()).with_fps(self.published.fps)
    }
}

/// Summary shown in the stats panel.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionStats {
    /// Per-class counts, most frequent first, ties by label.
    pub per_class: Vec<(String, usize)>,
    pub total: usize,
    pub fps: f64,
}

impl DetectionStats {
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn fps_text(&self) -> String {
        format!("{:.1}", self.fps)
    }

    pub fn top(&self, n: usize) -> &[(String, usize)] {
        &self.per_class[..n.min(self.per_class.len())]
    }
}

impl From<&[Detection]> for DetectionStats {
    fn from(detections: &[Detection]) -> Self {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for detection in detections {
            *counts.entry(detection.label.as_str()).or_default() += 1;
        }
        let mut per_class: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect();
        // BTreeMap order is by label, so a stable sort keeps ties alphabetical.
        per_class.sort_by(|a, b| b.1.cmp(&a.1));
        Self {
            per_class,
            total: detections.len(),
            fps: 0.0,
        }
    }
}

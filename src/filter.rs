//! User-controlled detection filtering: a class allow-list plus a confidence
//! threshold.
//!
//! The allow-list uses the empty set as the "no restriction" sentinel. The
//! threshold is applied after the detector's own (looser) cutoff, see
//! [`detector_min_score`].

use std::collections::BTreeSet;
use std::fmt;

use crate::detect::vocabulary;
use crate::detect::Detection;

pub const MIN_THRESHOLD: f32 = 0.1;
pub const MAX_THRESHOLD: f32 = 0.9;
pub const THRESHOLD_STEP: f32 = 0.05;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

// ----------------------------------------------------------------------------
// Class allow-list
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassFilter {
    allowed: BTreeSet<String>,
}

impl ClassFilter {
    /// Unrestricted filter.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Empty allow-list means every class passes.
    pub fn allows_all(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn is_allowed(&self, label: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(label)
    }

    /// Explicitly selected labels; empty when unrestricted.
    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn selected_count(&self) -> usize {
        self.allowed.len()
    }

    /// Add the label when absent, remove it when present. Removing the last
    /// label yields the empty set, which reads as "allow all".
    pub fn toggle_class(&mut self, label: &str) {
        if !self.allowed.remove(label) {
            self.allowed.insert(label.to_string());
        }
    }

    /// Remove the whole group when every member is explicitly selected,
    /// otherwise add the missing members.
    pub fn toggle_category(&mut self, labels: &[&str]) {
        let fully_selected = labels.iter().all(|label| self.allowed.contains(*label));
        if fully_selected {
            for label in labels {
                self.allowed.remove(*label);
            }
        } else {
            self.allowed
                .extend(labels.iter().map(|label| label.to_string()));
        }
    }

    /// Reset to "no restriction".
    pub fn select_all(&mut self) {
        self.allowed.clear();
    }

    /// Select the full vocabulary explicitly. Every class still passes, but
    /// individual classes can now be toggled off one by one.
    pub fn clear_all(&mut self) {
        self.allowed = vocabulary::all_labels().map(str::to_string).collect();
    }

    /// Keep detections whose label passes the allow-list.
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        if self.allowed.is_empty() {
            return detections;
        }
        detections
            .into_iter()
            .filter(|d| self.allowed.contains(&d.label))
            .collect()
    }

    /// Selection state of a category for display: all, some or none of its
    /// labels allowed.
    pub fn category_selection(&self, labels: &[&str]) -> Selection {
        let allowed = labels.iter().filter(|l| self.is_allowed(l)).count();
        match allowed {
            0 => Selection::None,
            n if n == labels.len() => Selection::All,
            _ => Selection::Partial,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    Partial,
    None,
}

// ----------------------------------------------------------------------------
// Confidence threshold
// ----------------------------------------------------------------------------

/// Final display/publish cutoff, kept inside [0.1, 0.9] on 0.05 steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfidenceThreshold(f32);

impl ConfidenceThreshold {
    pub fn new(value: f32) -> Self {
        Self(snap(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn step_up(self) -> Self {
        Self::new(self.0 + THRESHOLD_STEP)
    }

    pub fn step_down(self) -> Self {
        Self::new(self.0 - THRESHOLD_STEP)
    }

    pub fn sensitivity(self) -> Sensitivity {
        match self.0 {
            v if v <= 0.3 => Sensitivity::VerySensitive,
            v if v <= 0.5 => Sensitivity::Balanced,
            v if v <= 0.7 => Sensitivity::Precise,
            _ => Sensitivity::VeryPrecise,
        }
    }
}

impl Default for ConfidenceThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl fmt::Display for ConfidenceThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

fn snap(value: f32) -> f32 {
    if !value.is_finite() {
        return DEFAULT_THRESHOLD;
    }
    let steps = (value / THRESHOLD_STEP).round();
    (steps / 20.0).clamp(MIN_THRESHOLD, MAX_THRESHOLD)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sensitivity {
    VerySensitive,
    Balanced,
    Precise,
    VeryPrecise,
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Sensitivity::VerySensitive => "Very Sensitive",
            Sensitivity::Balanced => "Balanced",
            Sensitivity::Precise => "Precise",
            Sensitivity::VeryPrecise => "Very Precise",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Combined filter
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub classes: ClassFilter,
    pub threshold: ConfidenceThreshold,
}

impl FilterState {
    pub fn set_threshold(&mut self, value: f32) {
        self.threshold = ConfidenceThreshold::new(value);
    }

    /// Class cut first, then the confidence cut.
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let threshold = self.threshold.value();
        self.classes
            .apply(detections)
            .into_iter()
            .filter(|d| d.score >= threshold)
            .collect()
    }
}

pub fn apply_filters(detections: Vec<Detection>, filter: &FilterState) -> Vec<Detection> {
    filter.apply(detections)
}

/// The detector is queried at half the user threshold so banding has a wider
/// candidate pool before the final cut.
pub fn detector_min_score(threshold: ConfidenceThreshold) -> f32 {
    threshold.value() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, score: f32) -> Detection {
        Detection::new(label, score, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn labels(dets: &[Detection]) -> Vec<&str> {
        dets.iter().map(|d| d.label.as_str()).collect()
    }

    #[test]
    fn empty_allow_list_is_identity() {
        let input = vec![det("person", 0.9), det("kite", 0.1)];
        assert_eq!(ClassFilter::new().apply(input.clone()), input);
    }

    #[test]
    fn allow_list_keeps_exact_members() {
        let filter = ClassFilter::from_labels(["cat", "car"]);
        let out = filter.apply(vec![det("cat", 0.5), det("dog", 0.5), det("car", 0.2)]);
        assert_eq!(labels(&out), vec!["cat", "car"]);
    }

    #[test]
    fn combined_filter_scenario() {
        let state = FilterState {
            classes: ClassFilter::from_labels(["person", "car"]),
            threshold: ConfidenceThreshold::new(0.5),
        };
        let out = apply_filters(
            vec![det("person", 0.9), det("car", 0.4), det("dog", 0.95)],
            &state,
        );
        assert_eq!(out, vec![det("person", 0.9)]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let state = FilterState {
            classes: ClassFilter::new(),
            threshold: ConfidenceThreshold::new(0.6),
        };
        let out = state.apply(vec![det("cup", 0.6), det("cup", 0.59)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn raising_threshold_never_grows_result() {
        let input: Vec<Detection> = (0..=20).map(|i| det("cup", i as f32 / 20.0)).collect();
        let mut previous = usize::MAX;
        for step in 2..=18 {
            let state = FilterState {
                classes: ClassFilter::new(),
                threshold: ConfidenceThreshold::new(step as f32 * 0.05),
            };
            let out = state.apply(input.clone());
            assert!(out.iter().all(|d| d.score >= state.threshold.value()));
            assert!(out.len() <= previous);
            previous = out.len();
        }
    }

    #[test]
    fn toggle_class_adds_then_removes() {
        let mut filter = ClassFilter::new();
        filter.toggle_class("dog");
        assert!(filter.is_allowed("dog"));
        assert!(!filter.is_allowed("cat"));
        filter.toggle_class("dog");
        assert!(filter.allows_all());
    }

    #[test]
    fn toggle_category_twice_restores_selection() {
        let vehicles = vocabulary::category("Vehicles").unwrap();
        let mut filter = ClassFilter::from_labels(["person", "car"]);
        let before = filter.clone();

        filter.toggle_category(vehicles);
        assert_eq!(filter.selected_count(), 9);
        filter.toggle_category(vehicles);
        assert_eq!(filter.selected().collect::<Vec<_>>(), vec!["person"]);

        // Partial groups are completed first, so restoring needs the group to
        // start either fully selected or fully absent.
        let mut filter = before.clone();
        filter.toggle_category(&["dog", "cat"]);
        filter.toggle_category(&["dog", "cat"]);
        assert_eq!(filter, before);
    }

    #[test]
    fn select_all_and_clear_all() {
        let mut filter = ClassFilter::from_labels(["dog"]);
        filter.clear_all();
        assert_eq!(filter.selected_count(), 80);
        assert!(filter.is_allowed("toothbrush"));
        filter.toggle_class("toothbrush");
        assert!(!filter.is_allowed("toothbrush"));
        filter.select_all();
        assert!(filter.allows_all());
    }

    #[test]
    fn category_selection_reports_partial() {
        let animals = vocabulary::category("Animals").unwrap();
        let mut filter = ClassFilter::new();
        assert_eq!(filter.category_selection(animals), Selection::All);
        filter.toggle_class("dog");
        assert_eq!(filter.category_selection(animals), Selection::Partial);
        assert_eq!(filter.category_selection(&["car"]), Selection::None);
    }

    #[test]
    fn threshold_clamps_and_snaps() {
        assert_eq!(ConfidenceThreshold::new(0.0).value(), 0.1);
        assert_eq!(ConfidenceThreshold::new(1.0).value(), 0.9);
        assert_eq!(ConfidenceThreshold::new(0.62).value(), 0.6);
        assert_eq!(ConfidenceThreshold::new(0.63).value(), 0.65);
        assert_eq!(ConfidenceThreshold::new(f32::NAN).value(), 0.5);
        assert_eq!(ConfidenceThreshold::new(0.9).step_up().value(), 0.9);
        assert_eq!(ConfidenceThreshold::new(0.5).step_down().value(), 0.45);
        assert_eq!(ConfidenceThreshold::default().to_string(), "50%");
    }

    #[test]
    fn sensitivity_bands() {
        assert_eq!(
            ConfidenceThreshold::new(0.3).sensitivity(),
            Sensitivity::VerySensitive
        );
        assert_eq!(ConfidenceThreshold::new(0.5).sensitivity(), Sensitivity::Balanced);
        assert_eq!(ConfidenceThreshold::new(0.7).sensitivity(), Sensitivity::Precise);
        assert_eq!(
            ConfidenceThreshold::new(0.75).sensitivity(),
            Sensitivity::VeryPrecise
        );
        assert_eq!(Sensitivity::VeryPrecise.to_string(), "Very Precise");
    }

    #[test]
    fn detector_is_queried_at_half_threshold() {
        assert_eq!(detector_min_score(ConfidenceThreshold::new(0.6)), 0.3);
    }
}

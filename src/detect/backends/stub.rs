use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::{rank_candidates, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Scripted backend for tests and synthetic demos.
///
/// Steps are replayed in order; the last step repeats once the script is
/// exhausted. A `Scene` backend instead animates a handful of objects across
/// the frame with jittered scores.
pub struct ScriptedBackend {
    mode: Mode,
    calls: Arc<AtomicUsize>,
}

enum Mode {
    Script {
        steps: VecDeque<Step>,
        last: Option<Step>,
    },
    Scene(Scene),
}

#[derive(Clone)]
enum Step {
    Detections(Vec<Detection>),
    Fail(String),
}

impl ScriptedBackend {
    /// Returns the same detections on every call.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self::sequence(vec![detections])
    }

    /// Replays one detection list per call.
    pub fn sequence(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            mode: Mode::Script {
                steps: frames.into_iter().map(Step::Detections).collect(),
                last: None,
            },
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Animated scene with seeded score jitter.
    pub fn scene(seed: u64) -> Self {
        Self {
            mode: Mode::Scene(Scene::new(seed)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a failing call after the steps already scripted.
    pub fn then_fail(mut self, message: &str) -> Self {
        if let Mode::Script { steps, .. } = &mut self.mode {
            steps.push_back(Step::Fail(message.to_string()));
        }
        self
    }

    /// Queue another detection list after the steps already scripted.
    pub fn then(mut self, detections: Vec<Detection>) -> Self {
        if let Mode::Script { steps, .. } = &mut self.mode {
            steps.push_back(Step::Detections(detections));
        }
        self
    }

    /// Shared counter of `detect` invocations, readable after the backend
    /// has been boxed and handed to an adapter.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        max_candidates: usize,
        min_score: f32,
    ) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let candidates = match &mut self.mode {
            Mode::Script { steps, last } => {
                let step = match steps.pop_front() {
                    Some(step) => {
                        *last = Some(step.clone());
                        step
                    }
                    None => last.clone().unwrap_or(Step::Detections(Vec::new())),
                };
                match step {
                    Step::Detections(detections) => detections,
                    Step::Fail(message) => return Err(anyhow!(message)),
                }
            }
            Mode::Scene(scene) => scene.advance(frame.width, frame.height),
        };
        Ok(rank_candidates(candidates, max_candidates, min_score))
    }
}

// ----------------------------------------------------------------------------
// Animated scene
// ----------------------------------------------------------------------------

struct Actor {
    label: &'static str,
    base_score: f32,
    /// Position and size as fractions of the frame.
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    dx: f32,
    dy: f32,
}

struct Scene {
    actors: Vec<Actor>,
    rng: StdRng,
}

impl Scene {
    fn new(seed: u64) -> Self {
        let actors = vec![
            Actor {
                label: "person",
                base_score: 0.88,
                x: 0.10,
                y: 0.20,
                w: 0.22,
                h: 0.60,
                dx: 0.004,
                dy: 0.0,
            },
            Actor {
                label: "cup",
                base_score: 0.66,
                x: 0.60,
                y: 0.55,
                w: 0.08,
                h: 0.12,
                dx: -0.002,
                dy: 0.001,
            },
            Actor {
                label: "laptop",
                base_score: 0.72,
                x: 0.45,
                y: 0.60,
                w: 0.30,
                h: 0.25,
                dx: 0.0,
                dy: -0.001,
            },
            Actor {
                label: "dog",
                base_score: 0.48,
                x: 0.75,
                y: 0.40,
                w: 0.18,
                h: 0.20,
                dx: -0.003,
                dy: 0.002,
            },
        ];
        Self {
            actors,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn advance(&mut self, width: u32, height: u32) -> Vec<Detection> {
        let (fw, fh) = (width as f32, height as f32);
        let mut out = Vec::with_capacity(self.actors.len());
        for actor in &mut self.actors {
            actor.x += actor.dx;
            actor.y += actor.dy;
            if actor.x < 0.0 || actor.x + actor.w > 1.0 {
                actor.dx = -actor.dx;
                actor.x = actor.x.clamp(0.0, 1.0 - actor.w);
            }
            if actor.y < 0.0 || actor.y + actor.h > 1.0 {
                actor.dy = -actor.dy;
                actor.y = actor.y.clamp(0.0, 1.0 - actor.h);
            }
            let jitter: f32 = self.rng.gen_range(-0.08..0.08);
            let score = (actor.base_score + jitter).clamp(0.0, 1.0);
            out.push(Detection::new(
                actor.label,
                score,
                BoundingBox::new(actor.x * fw, actor.y * fh, actor.w * fw, actor.h * fh),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::solid(64, 48, [0, 0, 0], 0).unwrap()
    }

    fn det(label: &str, score: f32) -> Detection {
        Detection::new(label, score, BoundingBox::new(1.0, 1.0, 4.0, 4.0))
    }

    #[test]
    fn script_replays_then_repeats_last_step() -> Result<()> {
        let mut backend = ScriptedBackend::sequence(vec![vec![det("cat", 0.9)]])
            .then(vec![det("dog", 0.8)]);
        let counter = backend.call_counter();

        assert_eq!(backend.detect(&frame(), 20, 0.0)?[0].label, "cat");
        assert_eq!(backend.detect(&frame(), 20, 0.0)?[0].label, "dog");
        assert_eq!(backend.detect(&frame(), 20, 0.0)?[0].label, "dog");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn script_failure_surfaces_as_error() {
        let mut backend = ScriptedBackend::fixed(vec![]).then_fail("gpu lost");
        assert!(backend.detect(&frame(), 20, 0.0).is_ok());
        let err = backend.detect(&frame(), 20, 0.0).unwrap_err();
        assert!(err.to_string().contains("gpu lost"));
    }

    #[test]
    fn backend_honours_min_score_and_cap() -> Result<()> {
        let mut backend =
            ScriptedBackend::fixed(vec![det("a", 0.2), det("b", 0.5), det("c", 0.7)]);
        let out = backend.detect(&frame(), 1, 0.4)?;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "c");
        Ok(())
    }

    #[test]
    fn scene_keeps_boxes_inside_frame() -> Result<()> {
        let mut backend = ScriptedBackend::scene(7);
        let frame = frame();
        for _ in 0..500 {
            for d in backend.detect(&frame, 20, 0.0)? {
                assert!(d.bbox.x >= 0.0 && d.bbox.x + d.bbox.width <= 64.0 + 1e-3);
                assert!(d.bbox.y >= 0.0 && d.bbox.y + d.bbox.height <= 48.0 + 1e-3);
                assert!((0.0..=1.0).contains(&d.score));
            }
        }
        Ok(())
    }
}

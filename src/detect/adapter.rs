//! Detector lifecycle: one asynchronous load per session, then per-frame
//! inference.
//!
//! The model is loaded on a dedicated thread so the frame loop keeps ticking
//! while the (potentially slow) model read and warm-up run. `poll()` is the
//! only way the loop learns about completion and never blocks.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::error::PipelineError;
use crate::frame::Frame;

/// One-shot model constructor, executed on the loader thread.
pub type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelState {
    Loading,
    Ready,
    /// Load failed; detection stays disabled for the rest of the session.
    Failed(String),
}

pub struct DetectorAdapter {
    state: ModelState,
    backend: Option<Box<dyn DetectorBackend>>,
    pending: Option<Receiver<Result<Box<dyn DetectorBackend>>>>,
}

impl DetectorAdapter {
    /// Start loading the model in the background.
    pub fn spawn(loader: ModelLoader) -> Self {
        let (tx, rx) = mpsc::channel();
        log::info!("DetectorAdapter: loading model");
        let spawned = thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || {
                let result = loader().and_then(|mut backend| {
                    backend.warm_up()?;
                    Ok(backend)
                });
                // The adapter may already be gone; nothing to report then.
                let _ = tx.send(result);
            });
        match spawned {
            Ok(_) => Self {
                state: ModelState::Loading,
                backend: None,
                pending: Some(rx),
            },
            Err(err) => Self::failed(format!("spawn loader thread: {err}")),
        }
    }

    /// Adapter around an already constructed backend.
    pub fn ready(backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            state: ModelState::Ready,
            backend: Some(backend),
            pending: None,
        }
    }

    /// Adapter that will never detect.
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::error!("DetectorAdapter: model load failed: {}", reason);
        Self {
            state: ModelState::Failed(reason),
            backend: None,
            pending: None,
        }
    }

    /// Check for load completion without blocking.
    pub fn poll(&mut self) -> &ModelState {
        let Some(rx) = self.pending.as_ref() else {
            return &self.state;
        };
        match rx.try_recv() {
            Ok(result) => self.complete(result),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.complete(Err(anyhow::anyhow!("loader thread exited without a result")))
            }
        }
        &self.state
    }

    /// Block until the load finishes or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> &ModelState {
        let Some(rx) = self.pending.as_ref() else {
            return &self.state;
        };
        match rx.recv_timeout(timeout) {
            Ok(result) => self.complete(result),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                self.complete(Err(anyhow::anyhow!("loader thread exited without a result")))
            }
        }
        &self.state
    }

    fn complete(&mut self, result: Result<Box<dyn DetectorBackend>>) {
        self.pending = None;
        match result {
            Ok(backend) => {
                log::info!("DetectorAdapter: model '{}' ready", backend.name());
                self.backend = Some(backend);
                self.state = ModelState::Ready;
            }
            Err(err) => {
                log::error!("DetectorAdapter: model load failed: {:#}", err);
                self.state = ModelState::Failed(format!("{err:#}"));
            }
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ModelState::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state == ModelState::Loading
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// Run the detector on one frame. Callers check `is_ready()` first; an
    /// unready adapter answers with `PipelineError::ModelLoad`.
    pub fn infer(
        &mut self,
        frame: &Frame,
        max_candidates: usize,
        min_score: f32,
    ) -> Result<Vec<Detection>> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| PipelineError::ModelLoad("model not ready".to_string()))?;
        backend
            .detect(frame, max_candidates, min_score)
            .map_err(|err| PipelineError::Inference(format!("{err:#}")).into())
    }
}

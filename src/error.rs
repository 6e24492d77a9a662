//! Error taxonomy for the detection pipeline.
//!
//! Most of the crate propagates `anyhow::Result`; these variants mark the
//! failures that callers branch on. `ModelLoad` and `CameraAccess` are fatal to
//! their feature for the rest of the session but never to the process.
//! `FrameNotReady` is transient and only ever means "skip this cycle".

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("model failed to load: {0}")]
    ModelLoad(String),
    #[error("camera access failed: {0}")]
    CameraAccess(String),
    #[error("source frame not ready")]
    FrameNotReady,
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// Fatal errors disable detection or video for the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelLoad(_) | PipelineError::CameraAccess(_)
        )
    }
}

pub mod adapter;
mod backend;
pub mod backends;
mod registry;
mod result;
pub mod vocabulary;

pub use adapter::{DetectorAdapter, ModelLoader, ModelState};
pub use backend::{rank_candidates, DetectorBackend};
pub use backends::ScriptedBackend;
pub use registry::{BackendFactory, BackendRegistry};
pub use result::{BoundingBox, Detection};

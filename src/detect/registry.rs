use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::adapter::ModelLoader;
use crate::detect::backend::DetectorBackend;
use crate::detect::backends::ScriptedBackend;

/// Builds a backend from detector settings. Runs on the loader thread.
pub type BackendFactory =
    Arc<dyn Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Registry of named detector backend factories.
///
/// Backends are constructed lazily so the expensive part (reading and
/// optimising a model) happens off the frame loop.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |settings: &DetectorSettings| {
            Ok(Box::new(ScriptedBackend::scene(settings.seed)) as Box<dyn DetectorBackend>)
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings: &DetectorSettings| {
            let path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
            let backend = crate::detect::backends::TractBackend::new(
                path,
                settings.input_width,
                settings.input_height,
            )?;
            Ok(Box::new(backend) as Box<dyn DetectorBackend>)
        });
        registry
    }

    /// Register a factory. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<BackendFactory> {
        self.factories.get(name).cloned()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the configured backend (or the default) into a one-shot loader.
    pub fn loader(&self, settings: &DetectorSettings) -> Result<ModelLoader> {
        let name = match settings.backend.as_deref() {
            Some(name) => name,
            None => self
                .default_name()
                .ok_or_else(|| anyhow!("no detector backends registered"))?,
        };
        let factory = self.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not available (registered: {})",
                name,
                self.list().join(", ")
            )
        })?;
        let settings = settings.clone();
        Ok(Box::new(move || factory(&settings)))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

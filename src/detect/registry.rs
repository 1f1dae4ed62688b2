use std::collections::HashMap;

use crate::error::ConfigError;

use super::backend::DetectorBackend;

/// Named detector backends available to the pipeline.
///
/// Backends are handed out by value: the pipeline moves the selected backend
/// onto its inference worker, so a registry entry can be taken at most once.
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.backends.contains_key(name) {
            return Err(ConfigError::UnknownBackend(name.to_string()));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Remove a backend by name and hand over ownership.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn DetectorBackend>, ConfigError> {
        self.backends
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))
    }

    /// Remove the default backend.
    pub fn take_default(&mut self) -> Result<Box<dyn DetectorBackend>, ConfigError> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| ConfigError::Invalid("no detector backend registered".to_string()))?;
        self.take(&name)
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

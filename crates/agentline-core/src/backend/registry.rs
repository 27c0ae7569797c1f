//! Backend registry -- a named collection of available backends.
//!
//! Lets the CLI (or any other caller) pick a backend by name at runtime,
//! e.g. from `--backend codex` or a config file.

use std::collections::HashMap;

use super::claude::ClaudeBackend;
use super::codex::CodexBackend;
use super::trait_def::Backend;

/// A collection of registered [`Backend`] implementations, keyed by name.
///
/// # Example
///
/// ```
/// use agentline_core::backend::{AuthMode, BackendRegistry};
///
/// let mut registry = BackendRegistry::with_defaults();
/// let backend = registry.get_mut("codex").unwrap();
/// backend.set_auth_mode(AuthMode::Subscription);
/// assert!(backend.build_command("hello").is_ok());
/// ```
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the Claude and Codex backends with their default
    /// binaries.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ClaudeBackend::new());
        registry.register(CodexBackend::new());
        registry
    }

    /// Register a backend under [`Backend::name`].
    ///
    /// A backend already registered under the same name is replaced and
    /// returned.
    pub fn register(&mut self, backend: impl Backend + 'static) -> Option<Box<dyn Backend>> {
        let name = backend.name().to_string();
        self.backends.insert(name, Box::new(backend))
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<&dyn Backend> {
        self.backends.get(name).map(|b| b.as_ref())
    }

    /// Look up a backend by name for configuration (e.g. setting its auth
    /// mode).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Backend + 'static)> {
        self.backends.get_mut(name).map(|b| b.as_mut())
    }

    /// Remove a backend and hand ownership to the caller.
    pub fn take(&mut self, name: &str) -> Option<Box<dyn Backend>> {
        self.backends.remove(name)
    }

    /// Names of all registered backends, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AuthMode, BackendError};
    use crate::event::CodingEvent;

    /// Minimal test backend.
    struct FakeBackend {
        backend_name: String,
        auth_mode: Option<AuthMode>,
    }

    impl FakeBackend {
        fn new(name: &str) -> Self {
            Self {
                backend_name: name.to_string(),
                auth_mode: None,
            }
        }
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &str {
            &self.backend_name
        }

        fn auth_mode(&self) -> Option<AuthMode> {
            self.auth_mode
        }

        fn set_auth_mode(&mut self, mode: AuthMode) {
            self.auth_mode = Some(mode);
        }

        fn build_command(&self, prompt: &str) -> Result<Vec<String>, BackendError> {
            self.require_auth_mode()?;
            Ok(vec![self.backend_name.clone(), prompt.to_string()])
        }

        fn build_resume_command(
            &self,
            prompt: &str,
            _session_id: &str,
        ) -> Result<Vec<String>, BackendError> {
            self.build_command(prompt)
        }

        fn build_env_from(
            &self,
            ambient: HashMap<String, String>,
        ) -> Result<HashMap<String, String>, BackendError> {
            Ok(ambient)
        }

        fn parse_line(&self, _line: &str) -> Result<Option<CodingEvent>, BackendError> {
            Ok(None)
        }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = BackendRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn defaults_contain_claude_and_codex() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(registry.list(), vec!["claude", "codex"]);
        assert_eq!(registry.get("claude").unwrap().name(), "claude");
    }

    #[test]
    fn register_replaces_existing() {
        let mut registry = BackendRegistry::new();
        assert!(registry.register(FakeBackend::new("alpha")).is_none());
        let old = registry.register(FakeBackend::new("alpha"));
        assert_eq!(old.unwrap().name(), "alpha");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let registry = BackendRegistry::with_defaults();
        assert!(registry.get("gemini").is_none());
    }

    #[test]
    fn get_mut_configures_in_place() {
        let mut registry = BackendRegistry::new();
        registry.register(FakeBackend::new("alpha"));
        registry
            .get_mut("alpha")
            .unwrap()
            .set_auth_mode(AuthMode::ApiKey);
        assert_eq!(
            registry.get("alpha").unwrap().auth_mode(),
            Some(AuthMode::ApiKey)
        );
    }

    #[test]
    fn take_removes_backend() {
        let mut registry = BackendRegistry::with_defaults();
        let codex = registry.take("codex").unwrap();
        assert_eq!(codex.name(), "codex");
        assert_eq!(registry.list(), vec!["claude"]);
    }

    #[test]
    fn registry_debug_shows_names() {
        let registry = BackendRegistry::with_defaults();
        let debug = format!("{registry:?}");
        assert!(debug.contains("claude"));
        assert!(debug.contains("codex"));
    }
}

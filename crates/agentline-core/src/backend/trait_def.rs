//! The `Backend` trait -- the adapter interface for coding-agent CLIs.
//!
//! Each concrete backend (Claude, Codex) implements this trait. The trait is
//! object-safe so callers can hold `&dyn Backend` or `Box<dyn Backend>` (see
//! [`super::BackendRegistry`]) and tests can substitute a mock.

use std::collections::HashMap;

use super::auth::AuthMode;
use super::env;
use crate::event::{CodingEvent, EventError};

/// Errors reported by a [`Backend`].
///
/// Everything except [`BackendError::InvalidEvent`] is a configuration error
/// raised before any subprocess exists. `InvalidEvent` coming out of
/// [`Backend::parse_line`] means the parser itself is broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend '{backend}' has no auth mode; call set_auth_mode first")]
    AuthModeNotSet { backend: String },

    #[error("unknown auth mode: {0:?}")]
    UnknownAuthMode(String),

    #[error("backend '{backend}' needs {var} in the environment for api_key auth")]
    MissingCredential { backend: String, var: String },

    #[error("session id to resume must not be empty")]
    EmptySessionId,

    #[error("backend produced an invalid event: {0}")]
    InvalidEvent(#[from] EventError),
}

/// Adapter for one coding-agent CLI.
///
/// A backend knows how to build the argv and environment for its tool and
/// how to decode one line of the tool's output. Apart from the selected
/// [`AuthMode`] (and static configuration such as the binary path) it holds
/// no state, so one instance may serve any number of invocations.
///
/// # State
///
/// A freshly constructed backend is unconfigured. [`Backend::build_command`]
/// and [`Backend::build_env`] return [`BackendError::AuthModeNotSet`] until
/// [`Backend::set_auth_mode`] has been called.
pub trait Backend: Send + Sync {
    /// Short registry name (e.g. "claude").
    fn name(&self) -> &str;

    /// The currently selected auth mode, if any.
    fn auth_mode(&self) -> Option<AuthMode>;

    /// Select the credential convention used by later builds.
    fn set_auth_mode(&mut self, mode: AuthMode);

    /// Build the argv (binary first) for a fresh invocation.
    ///
    /// Must be deterministic for a given prompt and auth mode, and must never
    /// place secret values in argv.
    fn build_command(&self, prompt: &str) -> Result<Vec<String>, BackendError>;

    /// Build the argv that continues an earlier session.
    fn build_resume_command(
        &self,
        prompt: &str,
        session_id: &str,
    ) -> Result<Vec<String>, BackendError>;

    /// Build the subprocess environment from a snapshot of the ambient one.
    ///
    /// Strips variables that conflict with the auth mode and injects the
    /// ones it requires. The input map is consumed and a fresh map returned.
    fn build_env_from(
        &self,
        ambient: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, BackendError>;

    /// Decode one raw output line.
    ///
    /// Lines that do not match the tool's schema yield `Ok(None)`. `Err` is
    /// reserved for failures of the parser itself.
    fn parse_line(&self, line: &str) -> Result<Option<CodingEvent>, BackendError>;

    /// Build the subprocess environment from the current process environment.
    ///
    /// The process environment is only read, never modified.
    fn build_env(&self) -> Result<HashMap<String, String>, BackendError> {
        self.build_env_from(env::ambient_snapshot())
    }

    /// Return the auth mode or the "not configured" error.
    fn require_auth_mode(&self) -> Result<AuthMode, BackendError> {
        self.auth_mode().ok_or_else(|| BackendError::AuthModeNotSet {
            backend: self.name().to_string(),
        })
    }
}

// Compile-time assertion: Backend must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Backend) {}
};

#[cfg(test)]
mod tests {
    use super::*;

    /// A backend that echoes every line back as text.
    struct EchoBackend {
        auth_mode: Option<AuthMode>,
    }

    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn auth_mode(&self) -> Option<AuthMode> {
            self.auth_mode
        }

        fn set_auth_mode(&mut self, mode: AuthMode) {
            self.auth_mode = Some(mode);
        }

        fn build_command(&self, prompt: &str) -> Result<Vec<String>, BackendError> {
            self.require_auth_mode()?;
            Ok(vec!["echo".to_string(), prompt.to_string()])
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
            self.require_auth_mode()?;
            Ok(ambient)
        }

        fn parse_line(&self, line: &str) -> Result<Option<CodingEvent>, BackendError> {
            Ok(Some(CodingEvent::text(line)))
        }
    }

    #[test]
    fn backend_is_object_safe() {
        let backend: Box<dyn Backend> = Box::new(EchoBackend { auth_mode: None });
        assert_eq!(backend.name(), "echo");
    }

    #[test]
    fn unconfigured_backend_refuses_to_build() {
        let backend = EchoBackend { auth_mode: None };
        let err = backend.build_command("hi").unwrap_err();
        assert_eq!(
            err,
            BackendError::AuthModeNotSet {
                backend: "echo".to_string()
            }
        );
        assert!(backend.build_env().is_err());
    }

    #[test]
    fn configured_backend_builds() {
        let mut backend = EchoBackend { auth_mode: None };
        backend.set_auth_mode(AuthMode::Subscription);
        assert_eq!(backend.require_auth_mode().unwrap(), AuthMode::Subscription);
        assert_eq!(backend.build_command("hi").unwrap(), vec!["echo", "hi"]);
    }

    #[test]
    fn event_errors_convert_into_backend_errors() {
        let err: BackendError = CodingEvent::session("").unwrap_err().into();
        assert!(matches!(err, BackendError::InvalidEvent(_)));
    }
}

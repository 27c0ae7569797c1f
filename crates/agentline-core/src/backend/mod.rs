//! Backend adapter interface for coding-agent CLIs.
//!
//! This module defines the [`Backend`] trait that every CLI adapter
//! implements, the two adapters ([`ClaudeBackend`], [`CodexBackend`]), the
//! [`AuthMode`] they are configured with, and the [`BackendRegistry`] for
//! runtime lookup.
//!
//! # Architecture
//!
//! ```text
//! caller
//!     |
//!     v
//! BackendRegistry --get_mut("claude")--> &mut dyn Backend
//!     |                                        |
//!     |   set_auth_mode(mode) -----------------+
//!     |   build_command(prompt) --> argv
//!     |   build_env()           --> sanitized env
//!     |        |
//!     |        v
//!     |   process::spawn_backend --> Child
//!     |        |
//!     |        v
//!     |   StreamReader::read_child(child, &dyn Backend)
//!     |        |  parse_line(line) per stdout line
//!     |        v
//!     |   StreamResult { events, text, session_id, timed_out }
//! ```

pub mod auth;
pub mod claude;
pub mod codex;
pub mod env;
pub mod registry;
pub mod trait_def;

pub use auth::AuthMode;
pub use claude::ClaudeBackend;
pub use codex::CodexBackend;
pub use env::EnvDiff;
pub use registry::BackendRegistry;
pub use trait_def::{Backend, BackendError};

//! Drive coding-agent CLIs as subprocesses and normalize their output.
//!
//! - [`event`]: the closed [`CodingEvent`] vocabulary every backend emits.
//! - [`backend`]: the [`Backend`] trait, the Claude and Codex adapters, and
//!   the [`BackendRegistry`].
//! - [`process`]: spawning a configured backend and terminating it.
//! - [`stream`]: the [`StreamReader`] that turns one invocation into a
//!   [`StreamResult`] under a deadline.

pub mod backend;
pub mod event;
pub mod process;
pub mod stream;

pub use backend::{AuthMode, Backend, BackendError, BackendRegistry, ClaudeBackend, CodexBackend};
pub use event::{CodingEvent, EventError, EventKind};
pub use process::{SpawnError, SpawnRequest, spawn_backend};
pub use stream::{Completion, ReadError, StreamReader, StreamResult};

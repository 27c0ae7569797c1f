//! Reading a backend's streaming output into one aggregate result.
//!
//! [`StreamReader`] pumps a subprocess's stdout (or any async byte stream)
//! line by line through [`crate::backend::Backend::parse_line`] against a
//! deadline fixed when the read starts. The first of `done`, end of stream, or
//! the deadline ends the read; whatever was accumulated is returned as a
//! [`StreamResult`]. A broken parser surfaces as [`ReadError`], which still
//! carries the partial result.

pub mod decode;
pub mod reader;
pub mod result;

pub use decode::{DEFAULT_MAX_LINE_BYTES, StreamFault, decode_events};
pub use reader::{DEFAULT_GRACE_PERIOD, ReadError, StreamReader};
pub use result::{Completion, StreamResult};

//! Core types and error definitions for the resumer service.
//!
//! This crate provides the foundational types shared across all resumer
//! crates: the unified error enum, the recording status model exposed to
//! clients, and the conversation entry handed to the memory store once a
//! response has been fully recorded.
//!
//! # Main types
//!
//! - [`ResumerError`] — Unified error enum for every resumer subsystem.
//! - [`ResumerResult`] — Convenience alias for `Result<T, ResumerError>`.
//! - [`RecordingStatus`] — Lifecycle state of a recording session.
//! - [`RecordingProbe`] — Non-consuming status snapshot returned by probes.
//! - [`Entry`] — A single persisted conversation entry.

/// Conversation entries persisted by the memory store.
pub mod entry;
/// Error types.
pub mod error;
/// Recording status and probe types.
pub mod status;

pub use entry::{Entry, Role};
pub use error::{ResumerError, ResumerResult};
pub use status::{RecordingProbe, RecordingStatus};

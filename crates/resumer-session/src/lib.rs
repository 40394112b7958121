//! Recording and replay engine for in-flight responses.
//!
//! A producer records its output into a [`RecordingSession`] through a
//! [`Recorder`]; any number of [`Replay`] cursors read it back from an
//! arbitrary char offset and follow the live tail until the recording ends.

pub mod cancel;
pub mod chunk;
pub mod config;
pub mod recorder;
pub mod registry;
pub mod replay;
pub mod resumer;
pub mod session;
pub mod store;
pub mod sweeper;

pub use cancel::CancellationController;
pub use chunk::{Chunk, ChunkLog};
pub use config::{ConflictPolicy, MissingSessionPolicy, ResumerConfig};
pub use recorder::{Recorder, RecordingOutcome, SessionHandle};
pub use registry::{SessionRegistry, SweepReport};
pub use replay::{Replay, ReplayEvent, Replayer};
pub use resumer::ResponseResumer;
pub use session::{RecordingSession, SessionLimits};
pub use store::{EntryStore, FileEntryStore};
pub use sweeper::{RetentionSweeper, SweeperHandle};

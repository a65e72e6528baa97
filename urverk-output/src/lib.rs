//! # urverk-output
//!
//! Observation channels and the output plug-in ABI. The kernel pushes
//! `(t, model_path, port, value)` records into views; views buffer them for
//! the duration of a bag and flush on bag close, feeding the run digest and
//! the attached plug-in.
//!
//! ### Key Submodules:
//! - `plugin`: the five-entry plug-in contract plus `flush_by_bag`
//! - `view`: timed/event/finish channels and the bag-wise buffer
//! - `plugins`: console, file (CSV) and in-memory storage back-ends
//! - `digest`: blake3 digest of the flushed observation stream

pub mod digest;
pub mod plugin;
pub mod plugins;
pub mod view;

pub use digest::StreamDigest;
pub use plugin::OutputPlugin;
pub use plugins::{ConsoleOutput, FileOutput, StorageOutput};
pub use view::{Record, View, ViewId, ViewKind, ViewSet};

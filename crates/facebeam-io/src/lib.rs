//! facebeam-io — Collaborators for the recognition loop.
//!
//! Frame replay from a directory of stills, an out-of-process face embedder
//! speaking a small line protocol, and a display sink that renders frame
//! reports to the log.

pub mod embedder;
pub mod replay;
pub mod sink;

pub use embedder::ProcessEmbedder;
pub use replay::DirectoryFrameSource;
pub use sink::LogSink;

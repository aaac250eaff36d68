//! facelive-session: per-connection frame analysis.
//!
//! Frames arrive on [`FrameTrack`]s, are run through a face-mesh detector
//! owned by a dedicated thread, scored by the liveliness analyzer, and the
//! resulting JSON verdicts are pushed to the session's [`MessageSink`].

pub mod config;
pub mod engine;
pub mod processor;
pub mod registry;
pub mod sink;
pub mod track;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use engine::{
    spawn_detector, DetectorError, DetectorHandle, EngineError, FaceMesh, MeshFactory, MeshOptions,
};
pub use processor::{FrameProcessor, ProcessorError, TrackState};
pub use registry::{ConnectionState, RegistryError, SessionEvent, SessionId, SessionRegistry};
pub use sink::{MessageSink, SendError};
pub use track::{Frame, FrameError, FrameTrack, TrackKind};

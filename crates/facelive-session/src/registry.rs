//! Active analysis sessions, one per peer connection.
//!
//! The control-plane layer owns a [`SessionRegistry`] and forwards each
//! connection's events to it as typed [`SessionEvent`]s. Every session owns a
//! [`FrameProcessor`] with its own detector.

use std::collections::HashMap;

use facelive_core::LivelinessAnalyzer;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{spawn_detector, DetectorError, EngineError, MeshFactory};
use crate::processor::{FrameProcessor, ProcessorError};
use crate::sink::MessageSink;
use crate::track::{FrameTrack, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerConnection({})", self.0)
    }
}

/// Peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Connection events dispatched into a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// A remote media track was received. Only video tracks are analyzed.
    Track(FrameTrack),
    /// A remote track ended; the session's analysis stops.
    TrackEnded(TrackKind),
    /// The peer opened its data channel; verdicts are sent through it.
    DataChannel(MessageSink),
    /// A text message arrived on the data channel.
    Message(String),
    ConnectionState(ConnectionState),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("detector unavailable: {0}")]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

/// Reply for a keep-alive `ping...` message: `pong` plus the same suffix.
pub fn pong_for(message: &str) -> Option<String> {
    message.strip_prefix("ping").map(|rest| format!("pong{rest}"))
}

pub struct SessionRegistry {
    sessions: HashMap<SessionId, FrameProcessor>,
    factory: MeshFactory,
    config: Config,
}

impl SessionRegistry {
    pub fn new(factory: MeshFactory, config: Config) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open a session with a fresh detector.
    pub fn create(&mut self) -> Result<SessionId, RegistryError> {
        let mesh = (self.factory)(self.config.mesh_options())?;
        let detector = spawn_detector(mesh)?;
        let analyzer = LivelinessAnalyzer::new(self.config.liveliness());

        let id = SessionId::new();
        self.sessions
            .insert(id, FrameProcessor::new(detector, analyzer));
        tracing::info!(session = %id, "session created");
        Ok(id)
    }

    /// Start analysis of every track registered so far.
    pub fn start(&mut self, id: SessionId) -> Result<usize, RegistryError> {
        Ok(self.session_mut(id)?.start()?)
    }

    pub async fn dispatch(&mut self, id: SessionId, event: SessionEvent) -> Result<(), RegistryError> {
        match event {
            SessionEvent::Track(track) => {
                tracing::info!(session = %id, kind = ?track.kind(), "track received");
                if track.kind() == TrackKind::Video {
                    self.session_mut(id)?.add_track(track)?;
                }
            }
            SessionEvent::TrackEnded(kind) => {
                tracing::info!(session = %id, ?kind, "track ended");
                self.session_mut(id)?.stop().await;
            }
            SessionEvent::DataChannel(sink) => {
                self.session_mut(id)?.attach_sink(sink).await;
                tracing::info!(session = %id, "data channel mounted");
            }
            SessionEvent::Message(message) => {
                let processor = self.session_mut(id)?;
                if let Some(pong) = pong_for(&message) {
                    if let Err(e) = processor.reply(pong).await {
                        tracing::warn!(session = %id, error = %e, "pong dropped");
                    }
                }
            }
            SessionEvent::ConnectionState(state) => {
                tracing::info!(session = %id, ?state, "connection state changed");
                self.session_mut(id)?;
                if state == ConnectionState::Failed {
                    self.close(id).await;
                }
            }
        }
        Ok(())
    }

    /// Stop and forget a session. Returns `false` if it was unknown.
    pub async fn close(&mut self, id: SessionId) -> bool {
        let Some(mut processor) = self.sessions.remove(&id) else {
            return false;
        };
        processor.stop().await;
        tracing::info!(session = %id, "session closed");
        true
    }

    /// Close every session.
    pub async fn shutdown(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.close(id).await;
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&FrameProcessor> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut FrameProcessor, RegistryError> {
        self.sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))
    }
}

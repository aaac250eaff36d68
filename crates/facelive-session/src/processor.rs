use std::collections::HashMap;

use facelive_core::{AnalysisError, LivelinessAnalyzer, LivelinessVerdict};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::engine::{DetectorHandle, EngineError};
use crate::sink::{MessageSink, SendError, SinkSlot};
use crate::track::FrameTrack;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("detection failed: {0}")]
    Detection(#[from] EngineError),
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("verdict serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("track task ended abnormally: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("frame processor has been stopped")]
    Stopped,
}

/// Lifecycle of a registered track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Registered, no consumption task yet.
    Idle,
    Running,
    /// The task ended: track closed, failure, or joined.
    Finished,
}

type TrackTask = JoinHandle<Result<(), ProcessorError>>;

struct TrackEntry {
    track: Option<FrameTrack>,
    task: Option<TrackTask>,
}

/// Runs liveliness analysis over every registered track and forwards
/// verdicts to the attached sink.
///
/// Each track gets one consumption task. Frames of a track are analyzed and
/// sent strictly in arrival order. A detection or analysis failure ends that
/// track's task for good; a failed send only drops the message.
pub struct FrameProcessor {
    tracks: HashMap<String, TrackEntry>,
    detector: Option<DetectorHandle>,
    sink: SinkSlot,
    analyzer: LivelinessAnalyzer,
}

impl FrameProcessor {
    pub fn new(detector: DetectorHandle, analyzer: LivelinessAnalyzer) -> Self {
        Self {
            tracks: HashMap::new(),
            detector: Some(detector),
            sink: SinkSlot::default(),
            analyzer,
        }
    }

    /// Register a track without starting it. Returns `false` if a track with
    /// the same id is already registered.
    pub fn add_track(&mut self, track: FrameTrack) -> Result<bool, ProcessorError> {
        if self.detector.is_none() {
            return Err(ProcessorError::Stopped);
        }
        if self.tracks.contains_key(track.id()) {
            return Ok(false);
        }

        tracing::info!(track = %track.id(), kind = ?track.kind(), "track registered");
        self.tracks.insert(
            track.id().to_owned(),
            TrackEntry {
                track: Some(track),
                task: None,
            },
        );
        Ok(true)
    }

    /// Start a consumption task for every idle track. Tracks that already
    /// have a task are left alone. Returns the number of tasks started.
    pub fn start(&mut self) -> Result<usize, ProcessorError> {
        let detector = self.detector.as_ref().ok_or(ProcessorError::Stopped)?;

        let mut started = 0;
        for (id, entry) in &mut self.tracks {
            if entry.task.is_some() {
                continue;
            }
            let Some(track) = entry.track.take() else {
                continue;
            };

            let detector = detector.clone();
            let sink = self.sink.clone();
            let analyzer = self.analyzer;
            let id = id.clone();
            entry.task = Some(tokio::spawn(async move {
                let result = consume(track, detector, sink, analyzer).await;
                if let Err(e) = &result {
                    tracing::error!(track = %id, error = %e, "frame analysis stopped");
                }
                result
            }));
            started += 1;
        }

        if started > 0 {
            tracing::info!(started, "track tasks started");
        }
        Ok(started)
    }

    /// Cancel every track task, forget all tracks, detach the sink and
    /// release the detector. The processor cannot be restarted afterwards.
    pub async fn stop(&mut self) {
        for (id, entry) in self.tracks.drain() {
            let Some(task) = entry.task else {
                continue;
            };
            task.abort();
            match task.await {
                Err(e) if e.is_cancelled() => tracing::debug!(track = %id, "track task cancelled"),
                Err(e) => tracing::warn!(track = %id, error = %e, "track task panicked"),
                Ok(_) => {}
            }
        }

        self.sink.detach().await;

        if let Some(detector) = self.detector.take() {
            match detector.close().await {
                Ok(()) => tracing::info!("detector released"),
                Err(e) => tracing::warn!(error = %e, "detector already gone"),
            }
        }
    }

    /// Wait for every running task to finish on its own (its track ended or
    /// it failed) and report the outcome per track id.
    pub async fn join(&mut self) -> Vec<(String, Result<(), ProcessorError>)> {
        let mut outcomes = Vec::new();
        for (id, entry) in &mut self.tracks {
            let Some(task) = entry.task.take() else {
                continue;
            };
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) => Err(ProcessorError::Task(e)),
            };
            outcomes.push((id.clone(), outcome));
        }
        outcomes
    }

    /// Attach or replace the verdict sink. Verdicts computed while no sink
    /// is attached are dropped.
    pub async fn attach_sink(&self, sink: MessageSink) {
        if self.sink.attach(sink).await.is_some() {
            tracing::debug!("message sink replaced");
        } else {
            tracing::info!("message sink attached");
        }
    }

    pub async fn detach_sink(&self) -> Option<MessageSink> {
        self.sink.detach().await
    }

    /// Send a control message to the peer through the attached sink.
    pub async fn reply(&self, message: String) -> Result<(), SendError> {
        match self.sink.current().await {
            Some(sink) => sink.send(message).await,
            None => Err(SendError::NoSink),
        }
    }

    pub fn track_state(&self, id: &str) -> Option<TrackState> {
        self.tracks.get(id).map(|entry| match (&entry.track, &entry.task) {
            (Some(_), _) => TrackState::Idle,
            (None, Some(task)) if !task.is_finished() => TrackState::Running,
            _ => TrackState::Finished,
        })
    }

    /// Number of track tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.tracks
            .values()
            .filter(|entry| entry.task.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    pub fn is_stopped(&self) -> bool {
        self.detector.is_none()
    }
}

impl Drop for FrameProcessor {
    /// Abort track tasks that were never stopped. The detector thread closes
    /// its mesh once the last handle, including those held by the aborted
    /// tasks, is gone.
    fn drop(&mut self) {
        let mut aborted = 0;
        for entry in self.tracks.values() {
            if let Some(task) = &entry.task {
                task.abort();
                aborted += 1;
            }
        }
        if self.detector.take().is_some() {
            tracing::debug!(aborted, "frame processor dropped without stop");
        }
    }
}

/// Per-track loop: wait for a frame, detect, analyze, send, repeat.
async fn consume(
    mut track: FrameTrack,
    detector: DetectorHandle,
    sink: SinkSlot,
    analyzer: LivelinessAnalyzer,
) -> Result<(), ProcessorError> {
    let id = track.id().to_owned();
    tracing::debug!(track = %id, "consuming track");

    while let Some(frame) = track.recv().await {
        let (width, height) = (frame.width, frame.height);
        let faces = detector.detect(frame).await?;

        let verdict = match faces.as_slice() {
            [face] => LivelinessVerdict::single(analyzer.analyze(face, width, height)?),
            faces => LivelinessVerdict::counted(faces.len()),
        };

        let Some(sink) = sink.current().await else {
            continue;
        };
        let message = verdict.to_message()?;
        tracing::debug!(track = %id, num_faces = verdict.num_faces, "sending verdict");
        if let Err(e) = sink.send(message).await {
            tracing::warn!(track = %id, error = %e, "verdict dropped");
        }
    }

    tracing::info!(track = %id, "track ended");
    Ok(())
}

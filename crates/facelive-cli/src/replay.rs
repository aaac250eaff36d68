//! `facelive replay`: drive the frame analysis loop from a recording.
//!
//! A recording holds one JSON object per line:
//!
//! ```text
//! {"width": 640, "height": 480, "faces": [[[x, y, z], ...], ...]}
//! ```
//!
//! Each line becomes a blank frame of the given size; the recorded faces are
//! what the detector reports for it.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use facelive_core::{FaceLandmarks, LivelinessAnalyzer};
use facelive_session::{
    spawn_detector, Config, DetectorError, FaceMesh, Frame, FrameProcessor, FrameTrack,
    MessageSink, MeshOptions, TrackKind,
};
use image::RgbImage;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    width: u32,
    height: u32,
    #[serde(default)]
    faces: Vec<FaceLandmarks>,
}

fn parse_recording(raw: &str) -> Result<Vec<RecordedFrame>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid frame on line {}", n + 1))
        })
        .collect()
}

/// Detector that plays back recorded faces, one frame per call.
struct ReplayMesh {
    frames: VecDeque<Vec<FaceLandmarks>>,
    options: MeshOptions,
}

impl ReplayMesh {
    fn new(frames: VecDeque<Vec<FaceLandmarks>>, options: MeshOptions) -> Self {
        Self { frames, options }
    }
}

impl FaceMesh for ReplayMesh {
    fn process(&mut self, _image: &RgbImage) -> Result<Vec<FaceLandmarks>, DetectorError> {
        let mut faces = self
            .frames
            .pop_front()
            .ok_or_else(|| DetectorError::Failed("recording exhausted".into()))?;
        faces.truncate(self.options.max_num_faces);
        Ok(faces)
    }

    fn close(&mut self) {
        tracing::debug!(remaining = self.frames.len(), "replay detector closed");
    }
}

pub async fn run(path: &Path) -> Result<()> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let frames = parse_recording(&raw)?;
    let config = Config::from_env();
    tracing::info!(frames = frames.len(), path = %path.display(), "replaying recording");

    let (sink, mut messages) = MessageSink::channel(config.sink_buffer);
    let printer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            println!("{message}");
        }
    });

    let result = replay(frames, &config, sink).await;
    printer.await.context("output task failed")?;
    result
}

/// Feed every recorded frame through a fresh processor and wait until all
/// of them have been analyzed. Verdicts go to `sink`.
async fn replay(frames: Vec<RecordedFrame>, config: &Config, sink: MessageSink) -> Result<()> {
    let (sizes, faces): (Vec<_>, VecDeque<_>) = frames
        .into_iter()
        .map(|f| ((f.width, f.height), f.faces))
        .unzip();

    let mesh = ReplayMesh::new(faces, config.mesh_options());
    let detector = spawn_detector(Box::new(mesh))?;
    let mut processor =
        FrameProcessor::new(detector, LivelinessAnalyzer::new(config.liveliness()));
    processor.attach_sink(sink).await;

    let (frame_tx, track) = FrameTrack::named("replay", TrackKind::Video, config.frame_queue);
    processor.add_track(track)?;
    processor.start()?;

    for (width, height) in sizes {
        if frame_tx.send(Frame::blank(width, height)).await.is_err() {
            tracing::warn!("track task ended before the recording did");
            break;
        }
    }
    drop(frame_tx);

    let outcomes = processor.join().await;
    processor.stop().await;
    for (id, outcome) in outcomes {
        outcome.with_context(|| format!("track {id} failed"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recording_skips_blank_lines() {
        let raw = "{\"width\":4,\"height\":2}\n\n{\"width\":8,\"height\":6,\"faces\":[[[0.1,0.2,0.0]]]}\n";
        let frames = parse_recording(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].faces.is_empty());
        assert_eq!((frames[1].width, frames[1].height), (8, 6));
        assert_eq!(frames[1].faces[0].len(), 1);
    }

    #[test]
    fn test_parse_recording_reports_line() {
        let raw = "{\"width\":4,\"height\":2}\nnot json\n";
        let err = parse_recording(raw).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_replay_mesh_caps_faces() {
        let recorded = VecDeque::from(vec![vec![FaceLandmarks::default(); 3]]);
        let mut mesh = ReplayMesh::new(recorded, MeshOptions { max_num_faces: 2 });
        let image = RgbImage::new(1, 1);

        assert_eq!(mesh.process(&image).unwrap().len(), 2);
        assert!(matches!(mesh.process(&image), Err(DetectorError::Failed(_))));
    }

    #[tokio::test]
    async fn test_replay_emits_one_verdict_per_frame() {
        let frames = vec![
            RecordedFrame {
                width: 4,
                height: 4,
                faces: vec![],
            },
            RecordedFrame {
                width: 4,
                height: 4,
                faces: vec![FaceLandmarks::default(); 3],
            },
        ];
        let (sink, mut messages) = MessageSink::channel(8);

        replay(frames, &Config::default(), sink).await.unwrap();

        assert_eq!(messages.recv().await.as_deref(), Some(r#"{"num_face":0}"#));
        assert_eq!(messages.recv().await.as_deref(), Some(r#"{"num_face":2}"#));
        assert_eq!(messages.recv().await, None);
    }
}

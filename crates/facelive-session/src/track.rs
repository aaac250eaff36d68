//! Decoded video frames and the tracks that deliver them.

use image::RgbImage;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} BGR24")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A decoded frame in packed BGR24 order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// All-black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; width as usize * height as usize * 3], width, height)
    }

    /// Copy into an RGB image, swapping the channel order.
    pub fn to_rgb(&self) -> Result<RgbImage, FrameError> {
        let expected = self.width as usize * self.height as usize * 3;
        let mismatch = || FrameError::SizeMismatch {
            width: self.width,
            height: self.height,
            expected,
            actual: self.data.len(),
        };
        if self.data.len() != expected {
            return Err(mismatch());
        }

        let rgb: Vec<u8> = self
            .data
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect();
        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(mismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Receiving end of a media track's frame queue.
///
/// The track ends when every sender has been dropped.
#[derive(Debug)]
pub struct FrameTrack {
    id: String,
    kind: TrackKind,
    rx: mpsc::Receiver<Frame>,
}

impl FrameTrack {
    /// Create a track with a fresh id and a bounded queue of `capacity` frames.
    pub fn channel(kind: TrackKind, capacity: usize) -> (mpsc::Sender<Frame>, FrameTrack) {
        Self::named(Uuid::new_v4().to_string(), kind, capacity)
    }

    pub fn named(
        id: impl Into<String>,
        kind: TrackKind,
        capacity: usize,
    ) -> (mpsc::Sender<Frame>, FrameTrack) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            FrameTrack {
                id: id.into(),
                kind,
                rx,
            },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Wait for the next frame. `None` once the track has ended.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

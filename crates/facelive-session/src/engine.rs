use std::sync::Arc;

use facelive_core::FaceLandmarks;
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::track::{Frame, FrameError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("face mesh failed: {0}")]
    Failed(String),
    #[error("face mesh unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("detector thread exited")]
    ChannelClosed,
}

/// A face-mesh landmark detector.
///
/// Implementations need not be thread-safe: each instance is owned by a
/// single detector thread and called sequentially.
pub trait FaceMesh: Send {
    /// Detect faces in an RGB image, returning one landmark set per face.
    fn process(&mut self, image: &RgbImage) -> Result<Vec<FaceLandmarks>, DetectorError>;

    /// Release model resources. Called once, after the last `process`.
    fn close(&mut self) {}
}

/// Options handed to a [`MeshFactory`] when a session creates its detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshOptions {
    pub max_num_faces: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self { max_num_faces: 2 }
    }
}

/// Builds one detector per session.
pub type MeshFactory =
    Arc<dyn Fn(MeshOptions) -> Result<Box<dyn FaceMesh>, DetectorError> + Send + Sync>;

/// Messages sent from track tasks to the detector thread.
enum EngineRequest {
    Detect {
        frame: Frame,
        reply: oneshot::Sender<Result<Vec<FaceLandmarks>, EngineError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to a detector thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl DetectorHandle {
    /// Run the detector on one frame. Requests from all handles are served
    /// in arrival order.
    pub async fn detect(&self, frame: Frame) -> Result<Vec<FaceLandmarks>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Close the detector and wait for its resources to be released.
    /// Later `detect` calls fail with [`EngineError::ChannelClosed`].
    pub async fn close(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Close { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn a detector on a dedicated OS thread.
///
/// The thread owns `mesh` exclusively and serves detect requests one at a
/// time until closed or until every handle is dropped, then calls
/// [`FaceMesh::close`].
pub fn spawn_detector(mut mesh: Box<dyn FaceMesh>) -> Result<DetectorHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facelive-detector".into())
        .spawn(move || {
            tracing::info!("detector thread started");
            let mut close_reply = None;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { frame, reply } => {
                        let result = run_detect(mesh.as_mut(), &frame);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Close { reply } => {
                        close_reply = Some(reply);
                        break;
                    }
                }
            }
            mesh.close();
            tracing::info!("detector closed");
            if let Some(reply) = close_reply {
                let _ = reply.send(());
            }
        })
        .map_err(EngineError::Spawn)?;

    Ok(DetectorHandle { tx })
}

fn run_detect(mesh: &mut dyn FaceMesh, frame: &Frame) -> Result<Vec<FaceLandmarks>, EngineError> {
    let image = frame.to_rgb()?;
    let faces = mesh.process(&image)?;
    tracing::trace!(
        width = frame.width,
        height = frame.height,
        faces = faces.len(),
        "frame processed"
    );
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::ScriptedMesh;

    #[tokio::test]
    async fn test_detect_returns_scripted_faces_in_order() {
        let mesh = ScriptedMesh::new(vec![
            Ok(vec![]),
            Ok(vec![FaceLandmarks::default(), FaceLandmarks::default()]),
        ]);
        let handle = spawn_detector(Box::new(mesh)).unwrap();

        assert_eq!(handle.detect(Frame::blank(4, 4)).await.unwrap().len(), 0);
        assert_eq!(handle.detect(Frame::blank(4, 4)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_detector_sees_rgb_image() {
        let mesh = ScriptedMesh::new(vec![Ok(vec![])]);
        let seen = mesh.last_pixel.clone();
        let handle = spawn_detector(Box::new(mesh)).unwrap();

        handle
            .detect(Frame::new(vec![10, 20, 30], 1, 1))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some([30, 20, 10]));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_an_error() {
        let handle = spawn_detector(Box::new(ScriptedMesh::new(vec![]))).unwrap();
        let err = handle.detect(Frame::new(vec![0; 7], 2, 2)).await.unwrap_err();
        assert!(matches!(err, EngineError::Frame(FrameError::SizeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_detector_failure_is_reported() {
        let mesh = ScriptedMesh::new(vec![Err(DetectorError::Failed("boom".into()))]);
        let handle = spawn_detector(Box::new(mesh)).unwrap();
        let err = handle.detect(Frame::blank(2, 2)).await.unwrap_err();
        assert!(matches!(err, EngineError::Detector(DetectorError::Failed(_))));
    }

    #[tokio::test]
    async fn test_close_releases_mesh_and_rejects_further_work() {
        let mesh = ScriptedMesh::new(vec![]);
        let closed = mesh.closed.clone();
        let handle = spawn_detector(Box::new(mesh)).unwrap();

        handle.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(
            handle.detect(Frame::blank(2, 2)).await,
            Err(EngineError::ChannelClosed)
        ));
    }
}

//! Shared fixtures for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use facelive_core::landmarks::{index, FACE_MESH_POINTS};
use facelive_core::{FaceLandmarks, LandmarkPoint};
use image::RgbImage;

use crate::engine::{DetectorError, FaceMesh, MeshFactory};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

type Script = VecDeque<Result<Vec<FaceLandmarks>, DetectorError>>;

/// Detector that returns pre-recorded results, one per call, then no faces.
pub struct ScriptedMesh {
    script: Script,
    pub closed: Arc<AtomicBool>,
    pub processed: Arc<AtomicUsize>,
    pub last_pixel: Arc<Mutex<Option<[u8; 3]>>>,
}

impl ScriptedMesh {
    pub fn new(script: Vec<Result<Vec<FaceLandmarks>, DetectorError>>) -> Self {
        Self {
            script: script.into(),
            closed: Arc::default(),
            processed: Arc::default(),
            last_pixel: Arc::default(),
        }
    }
}

impl FaceMesh for ScriptedMesh {
    fn process(&mut self, image: &RgbImage) -> Result<Vec<FaceLandmarks>, DetectorError> {
        if let Some(px) = image.pixels().next() {
            *self.last_pixel.lock().unwrap() = Some(px.0);
        }
        let result = self.script.pop_front().unwrap_or(Ok(Vec::new()));
        self.processed.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory handing out scripted meshes; records each mesh's close flag.
pub fn scripted_factory(
    script: Vec<Result<Vec<FaceLandmarks>, DetectorError>>,
) -> (MeshFactory, Arc<Mutex<Vec<Arc<AtomicBool>>>>) {
    let closed_flags: Arc<Mutex<Vec<Arc<AtomicBool>>>> = Arc::default();
    let flags = closed_flags.clone();
    let factory: MeshFactory = Arc::new(move |_options| {
        let mesh = ScriptedMesh::new(script.clone());
        flags.lock().unwrap().push(mesh.closed.clone());
        Ok(Box::new(mesh) as Box<dyn FaceMesh>)
    });
    (factory, closed_flags)
}

/// Wait until `counter` reaches `n`, then give the consuming task time to
/// finish the frame.
pub async fn wait_processed(counter: &AtomicUsize, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("detector did not process frames in time");
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Wait until a detector's mesh has been closed.
pub async fn wait_closed(flag: &AtomicBool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("detector was not closed in time");
}

pub async fn next_message(rx: &mut tokio::sync::mpsc::Receiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("sink closed")
}

fn at(x: i32, y: i32) -> LandmarkPoint {
    LandmarkPoint::new(
        ((f64::from(x) + 0.5) / f64::from(WIDTH)) as f32,
        ((f64::from(y) + 0.5) / f64::from(HEIGHT)) as f32,
        0.0,
    )
}

/// Frontal, open-eyed, non-smiling face in a 640x480 frame.
///
/// Its verdict box is `[176, 173, 464, 420]`.
pub fn frontal_face() -> FaceLandmarks {
    let mut points = vec![at(320, 240); FACE_MESH_POINTS];

    points[index::RIGHT_EYE_OUTER] = at(250, 200);
    points[index::RIGHT_EYE_INNER] = at(290, 200);
    points[index::RIGHT_EYE_UPPER_LID] = at(270, 194);
    points[index::RIGHT_EYE_LOWER_LID] = at(270, 206);

    points[index::LEFT_EYE_OUTER] = at(390, 200);
    points[index::LEFT_EYE_INNER] = at(350, 200);
    points[index::LEFT_EYE_UPPER_LID] = at(370, 194);
    points[index::LEFT_EYE_LOWER_LID] = at(370, 206);

    points[index::MOUTH_RIGHT_CORNER] = at(280, 330);
    points[index::MOUTH_LEFT_CORNER] = at(360, 330);
    points[index::JAW_RIGHT] = at(200, 300);
    points[index::JAW_LEFT] = at(440, 300);
    points[index::CHIN] = at(320, 400);

    FaceLandmarks::new(points)
}

/// A face mesh cut short before the eye landmarks.
pub fn truncated_face() -> FaceLandmarks {
    FaceLandmarks::new(frontal_face().0[..300].to_vec())
}

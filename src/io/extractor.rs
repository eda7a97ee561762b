//! Facial landmark extraction boundary
//!
//! The detection model (camera driver, face detector, landmark and
//! embedding networks) lives outside this process and is trusted:
//! whatever it reports per frame is taken as ground truth. This module
//! defines the `LandmarkExtractor` seam the pipeline calls through, plus
//! a scripted implementation used by tests and the `sim` binary.

use crate::domain::types::{DetectedFace, FaceLandmarks, Frame, Landmark};
use crate::domain::ExtractError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Boundary to the face detection model.
///
/// One call covers one frame and returns every face found in it, each
/// with eye contours, nose tip, and identity embedding. An empty vec
/// means no face; the caller decides what that implies.
#[async_trait]
pub trait LandmarkExtractor: Send + Sync {
    async fn extract(&self, frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError>;
}

struct ScriptState {
    queue: VecDeque<Vec<DetectedFace>>,
    last: Option<Vec<DetectedFace>>,
}

/// Extractor that replays a pre-built per-frame script.
///
/// Each `extract` call pops the next scripted detection. When the script
/// runs out it returns no faces, or repeats the final detection when
/// built with `with_hold_last` (a subject standing still in front of
/// the camera).
pub struct ScriptedExtractor {
    state: Mutex<ScriptState>,
    hold_last: bool,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self { state: Mutex::new(ScriptState { queue: VecDeque::new(), last: None }), hold_last: false }
    }

    pub fn with_script(frames: Vec<Vec<DetectedFace>>) -> Self {
        Self {
            state: Mutex::new(ScriptState { queue: frames.into(), last: None }),
            hold_last: false,
        }
    }

    /// Repeat the last scripted detection once the queue runs dry
    pub fn with_hold_last(mut self) -> Self {
        self.hold_last = true;
        self
    }

    /// Append one frame's detections to the script
    pub fn push(&self, faces: Vec<DetectedFace>) {
        self.state.lock().queue.push_back(faces);
    }
}

impl Default for ScriptedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LandmarkExtractor for ScriptedExtractor {
    async fn extract(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, ExtractError> {
        let mut state = self.state.lock();
        if let Some(faces) = state.queue.pop_front() {
            state.last = Some(faces.clone());
            return Ok(faces);
        }
        if self.hold_last {
            return Ok(state.last.clone().unwrap_or_default());
        }
        Ok(Vec::new())
    }
}

/// Build a six-point eye contour whose aspect ratio equals `openness`.
///
/// Corner-to-corner width is fixed at 10px with both vertical pairs at
/// height 10*openness, so (|p2-p6| + |p3-p5|) / (2*|p1-p4|) comes out
/// to exactly `openness`.
fn eye_contour(origin_x: f32, origin_y: f32, openness: f32) -> [Landmark; 6] {
    let half = 5.0 * openness;
    [
        Landmark { x: origin_x, y: origin_y },
        Landmark { x: origin_x + 3.0, y: origin_y - half },
        Landmark { x: origin_x + 7.0, y: origin_y - half },
        Landmark { x: origin_x + 10.0, y: origin_y },
        Landmark { x: origin_x + 7.0, y: origin_y + half },
        Landmark { x: origin_x + 3.0, y: origin_y + half },
    ]
}

/// Build a synthetic detection with both eyes at `openness` and the
/// nose tip at the given position. Eye contours ride along with the
/// nose so only deliberate nose displacement reads as head movement.
pub fn synthetic_face(openness: f32, nose_x: f32, nose_y: f32, embedding: Vec<f32>) -> DetectedFace {
    DetectedFace {
        landmarks: FaceLandmarks {
            left_eye: eye_contour(nose_x - 30.0, nose_y - 20.0, openness),
            right_eye: eye_contour(nose_x + 20.0, nose_y - 20.0, openness),
            nose_tip: Landmark { x: nose_x, y: nose_y },
        },
        embedding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ear(eye: &[Landmark; 6]) -> f32 {
        let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
        let horizontal = eye[0].distance(&eye[3]);
        vertical / (2.0 * horizontal)
    }

    #[test]
    fn test_eye_contour_aspect_ratio_matches_openness() {
        for openness in [0.05f32, 0.21, 0.3, 0.45] {
            let eye = eye_contour(100.0, 50.0, openness);
            assert!((ear(&eye) - openness).abs() < 1e-5);
        }
    }

    #[test]
    fn test_synthetic_face_geometry() {
        let face = synthetic_face(0.3, 320.0, 240.0, vec![0.0; 4]);
        assert_eq!(face.landmarks.nose_tip.x, 320.0);
        assert_eq!(face.landmarks.nose_tip.y, 240.0);
        assert!((ear(&face.landmarks.left_eye) - 0.3).abs() < 1e-5);
        assert!((ear(&face.landmarks.right_eye) - 0.3).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_scripted_extractor_replays_in_order() {
        let extractor = ScriptedExtractor::with_script(vec![
            vec![synthetic_face(0.3, 320.0, 240.0, vec![1.0])],
            vec![],
            vec![
                synthetic_face(0.3, 200.0, 240.0, vec![1.0]),
                synthetic_face(0.3, 400.0, 240.0, vec![2.0]),
            ],
        ]);
        let frame = Frame::synthetic(1);

        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 1);
        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 0);
        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 2);
        // Script exhausted
        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_hold_last_repeats_final_detection() {
        let extractor = ScriptedExtractor::with_script(vec![vec![synthetic_face(
            0.3, 320.0, 240.0,
            vec![1.0],
        )]])
        .with_hold_last();
        let frame = Frame::synthetic(1);

        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 1);
        let held = extractor.extract(&frame).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].landmarks.nose_tip.x, 320.0);
    }

    #[tokio::test]
    async fn test_push_extends_script() {
        let extractor = ScriptedExtractor::new();
        let frame = Frame::synthetic(1);
        assert!(extractor.extract(&frame).await.unwrap().is_empty());

        extractor.push(vec![synthetic_face(0.3, 320.0, 240.0, vec![1.0])]);
        assert_eq!(extractor.extract(&frame).await.unwrap().len(), 1);
    }
}

//! Liveness challenge tracking
//!
//! A `LivenessSession` watches the landmark stream while a subject
//! stands at the kiosk and latches two involuntary-motion signals a
//! printed photo cannot produce: a blink (eye aspect ratio dipping
//! below the closure threshold for enough consecutive frames, then
//! recovering) and a head movement (nose tip displaced between
//! consecutive frames). The subject passes only while exactly one face
//! is in frame; zero means nobody is there, two or more means a second
//! person or a held-up photo has entered the shot.
//!
//! Sessions only ever observe and answer - a subject who fails simply
//! is not live, which is a verdict, not an error.

use crate::domain::types::{DetectedFace, Landmark};
use crate::infra::Config;

/// Eye aspect ratio over a six-point contour: the two vertical gaps
/// divided by twice the corner-to-corner width. Open eyes sit around
/// 0.25-0.35, closed near 0.05. A degenerate contour reads as closed.
pub fn eye_aspect_ratio(eye: &[Landmark; 6]) -> f32 {
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal < f32::EPSILON {
        return 0.0;
    }
    let vertical = eye[1].distance(&eye[5]) + eye[2].distance(&eye[4]);
    vertical / (2.0 * horizontal)
}

/// Copyable view of a session's verdict at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LivenessSnapshot {
    pub blink_detected: bool,
    pub movement_detected: bool,
    /// Faces in the most recently observed frame
    pub face_count: usize,
    pub frames_observed: u64,
}

impl LivenessSnapshot {
    pub fn is_live(&self) -> bool {
        self.blink_detected && self.movement_detected && self.face_count == 1
    }
}

pub struct LivenessSession {
    ear_close_threshold: f32,
    min_closed_frames: u32,
    movement_min_px: f32,
    blink_detected: bool,
    movement_detected: bool,
    face_count: usize,
    previous_nose: Option<Landmark>,
    closed_frames: u32,
    frames_observed: u64,
}

impl LivenessSession {
    pub fn new(config: &Config) -> Self {
        Self {
            ear_close_threshold: config.ear_close_threshold(),
            min_closed_frames: config.min_closed_frames(),
            movement_min_px: config.movement_min_px(),
            blink_detected: false,
            movement_detected: false,
            face_count: 0,
            previous_nose: None,
            closed_frames: 0,
            frames_observed: 0,
        }
    }

    /// Feed one frame's detections into the session.
    ///
    /// Frames without exactly one face carry no usable signal: latched
    /// detections persist, but closure counting and nose tracking
    /// restart so a gap never links into the sequences on either side.
    pub fn observe(&mut self, faces: &[DetectedFace]) {
        self.frames_observed += 1;
        self.face_count = faces.len();

        if faces.len() != 1 {
            self.previous_nose = None;
            self.closed_frames = 0;
            return;
        }

        let landmarks = &faces[0].landmarks;

        let ear =
            (eye_aspect_ratio(&landmarks.left_eye) + eye_aspect_ratio(&landmarks.right_eye)) / 2.0;
        if ear < self.ear_close_threshold {
            self.closed_frames += 1;
        } else {
            // Reopening after a long enough closure completes a blink
            if self.closed_frames >= self.min_closed_frames {
                self.blink_detected = true;
            }
            self.closed_frames = 0;
        }

        if let Some(previous) = self.previous_nose {
            if landmarks.nose_tip.distance(&previous) > self.movement_min_px {
                self.movement_detected = true;
            }
        }
        self.previous_nose = Some(landmarks.nose_tip);
    }

    /// Blink observed, head moved, and exactly one face in the latest frame
    pub fn is_live(&self) -> bool {
        self.blink_detected && self.movement_detected && self.face_count == 1
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        LivenessSnapshot {
            blink_detected: self.blink_detected,
            movement_detected: self.movement_detected,
            face_count: self.face_count,
            frames_observed: self.frames_observed,
        }
    }
}

use crate::scene::NodeId;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Identifier the input source gives a finger for the life of one contact.
pub type FingerId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchPhase {
    Added,
    Moved,
    Removed,
}

/// One raw contact update from the input source, in global coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    pub finger_id: FingerId,
    pub phase: TouchPhase,
    pub point: Point,
    /// Seconds on the caller's clock.
    pub time: f64,
}

impl TouchSample {
    pub fn new(finger_id: FingerId, phase: TouchPhase, point: Point, time: f64) -> Self {
        Self {
            finger_id,
            phase,
            point,
            time,
        }
    }

    pub fn added(finger_id: FingerId, point: Point, time: f64) -> Self {
        Self::new(finger_id, TouchPhase::Added, point, time)
    }

    pub fn moved(finger_id: FingerId, point: Point, time: f64) -> Self {
        Self::new(finger_id, TouchPhase::Moved, point, time)
    }

    pub fn removed(finger_id: FingerId, point: Point, time: f64) -> Self {
        Self::new(finger_id, TouchPhase::Removed, point, time)
    }
}

/// Per-finger state as seen by a node, with the gesture's derived quantities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchInfo {
    pub finger_id: FingerId,
    pub phase: TouchPhase,
    pub start_point: Point,
    pub current_point: Point,
    /// Movement since the previous sample of this finger.
    pub delta: Vec2,
    /// Whether this finger is one of the control fingers.
    pub active: bool,
    /// Fingers still down on the node.
    pub finger_count: usize,
    pub start_distance: f64,
    pub current_distance: f64,
    /// Current inter-finger distance over the starting one.
    pub current_scale: f64,
    /// Change of the control fingers' bearing, radians.
    pub current_angle: f64,
}

impl TouchInfo {
    pub(crate) fn from_sample(sample: &TouchSample) -> Self {
        Self {
            finger_id: sample.finger_id,
            phase: sample.phase,
            start_point: sample.point,
            current_point: sample.point,
            delta: Vec2::ZERO,
            active: false,
            finger_count: 0,
            start_distance: 0.0,
            current_distance: 0.0,
            current_scale: 1.0,
            current_angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureKind {
    Touch(TouchInfo),
    Tap(Point),
    DoubleTap(Point),
    /// Average per-sample displacement of the swipe.
    Swipe(Vec2),
}

/// Semantic event emitted for a node.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureEvent {
    pub node: NodeId,
    pub kind: GestureKind,
}

//! Multi-touch gesture engine.
//!
//! Raw [`TouchSample`]s are routed to the node under the finger and folded
//! into a per-node gesture state machine that drives the node's transform and
//! reports taps, double taps and swipes as [`GestureEvent`]s.

mod engine;
mod gesture;
mod info;

pub use engine::TouchEngine;
pub use info::{FingerId, GestureEvent, GestureKind, TouchInfo, TouchPhase, TouchSample};

use serde::{Deserialize, Serialize};

/// Which parts of a node's transform a multi-finger gesture may change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiTouchConstraints {
    pub position_x: bool,
    pub position_y: bool,
    pub scale: bool,
    pub rotate: bool,
}

impl MultiTouchConstraints {
    pub const NONE: Self = Self {
        position_x: false,
        position_y: false,
        scale: false,
        rotate: false,
    };

    pub const POSITION: Self = Self {
        position_x: true,
        position_y: true,
        ..Self::NONE
    };

    pub const ALL: Self = Self {
        position_x: true,
        position_y: true,
        scale: true,
        rotate: true,
    };

    pub fn any(self) -> bool {
        self.position_x || self.position_y || self.scale || self.rotate
    }
}

/// Gestures a node reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchCapabilities {
    /// Track fingers and drive the transform through `constraints`.
    pub multi_touch: bool,
    pub constraints: MultiTouchConstraints,
    pub tap: bool,
    pub double_tap: bool,
    pub swipe: bool,
}

impl TouchCapabilities {
    /// Drag, pinch and rotate.
    pub fn manipulable() -> Self {
        Self {
            multi_touch: true,
            constraints: MultiTouchConstraints::ALL,
            ..Self::default()
        }
    }

    pub fn tappable() -> Self {
        Self {
            tap: true,
            ..Self::default()
        }
    }

    pub(crate) fn wants_tap(self) -> bool {
        self.tap || self.double_tap
    }
}

//! Per-node gesture state machine.

use super::info::{FingerId, GestureEvent, GestureKind, TouchInfo, TouchPhase, TouchSample};
use super::TouchCapabilities;
use crate::scene::{Node, NodeId, SceneGraph};
use crate::settings::TouchSettings;
use kurbo::{Affine, Point, Vec2};
use std::collections::{BTreeMap, VecDeque};

/// Control-finger spreads below this keep the previous selection.
const SPREAD_EPSILON: f64 = 1e-6;

/// Everything one sample needs besides the gesture state itself.
pub(crate) struct GestureContext<'a> {
    pub graph: &'a mut SceneGraph,
    pub node: NodeId,
    pub settings: &'a TouchSettings,
    pub events: &'a mut Vec<GestureEvent>,
}

impl GestureContext<'_> {
    fn emit(&mut self, kind: GestureKind) {
        self.events.push(GestureEvent { node: self.node, kind });
    }
}

/// Fingers, control selection and tap/swipe bookkeeping of one node.
///
/// Idle while `fingers` is empty, tracking otherwise.
#[derive(Debug, Clone, Default)]
pub(crate) struct GestureState {
    fingers: BTreeMap<FingerId, TouchInfo>,
    control: [Option<FingerId>; 2],
    /// Pivot of the gesture in the node's unit square.
    anchor: Point,
    /// Center the node had before the gesture re-anchored it.
    start_anchor: Option<Point>,
    start_position: Point,
    start_rotation: f64,
    start_scale: Vec2,
    start_distance: f64,
    current_distance: f64,
    current_scale: f64,
    current_angle: f64,
    swipe_finger: Option<FingerId>,
    swipe_queue: VecDeque<(Point, f64)>,
    tappable: bool,
    tap_origin: Point,
    /// First tap of a possible double tap: position and time.
    pending_tap: Option<(Point, f64)>,
}

impl GestureState {
    pub fn is_idle(&self) -> bool {
        self.fingers.is_empty()
    }

    pub fn has_pending_tap(&self) -> bool {
        self.pending_tap.is_some()
    }

    pub fn control_fingers(&self) -> [Option<FingerId>; 2] {
        self.control
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn process(&mut self, ctx: &mut GestureContext<'_>, sample: &TouchSample) {
        let Some(node) = ctx.graph.node(ctx.node) else {
            return;
        };
        let caps = node.touch;
        if !(node.is_visible() && node.is_enabled()) {
            // Finish whatever is in flight without firing taps or swipes.
            self.tappable = false;
            if sample.phase == TouchPhase::Removed {
                self.finish_finger(ctx, caps, sample);
            }
            return;
        }

        match sample.phase {
            TouchPhase::Added => self.added(ctx, caps, sample),
            TouchPhase::Moved => self.moved(ctx, caps, sample),
            TouchPhase::Removed => self.removed(ctx, caps, sample),
        }
    }

    fn added(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, sample: &TouchSample) {
        if self.fingers.contains_key(&sample.finger_id) {
            log::debug!("Ignoring duplicate add of finger {}", sample.finger_id);
            return;
        }

        self.tappable = caps.wants_tap() && self.fingers.is_empty();
        if self.fingers.is_empty() {
            self.tap_origin = sample.point;
            self.swipe_queue.clear();
            self.swipe_finger = Some(sample.finger_id);
        }

        self.fingers.insert(sample.finger_id, TouchInfo::from_sample(sample));
        if self.swipe_finger == Some(sample.finger_id) {
            self.push_swipe(ctx.settings, sample);
        }
        self.select_control(ctx, caps);
        paint(ctx, sample.point, sample.point);
        self.emit_touch(ctx, sample.finger_id);
    }

    fn moved(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, sample: &TouchSample) {
        let Some(info) = self.fingers.get_mut(&sample.finger_id) else {
            return;
        };
        let previous = info.current_point;
        info.phase = TouchPhase::Moved;
        info.delta = sample.point - previous;
        info.current_point = sample.point;

        if self.tappable && sample.point.distance(self.tap_origin) > ctx.settings.min_tap_distance {
            self.tappable = false;
        }
        if self.swipe_finger == Some(sample.finger_id) {
            self.push_swipe(ctx.settings, sample);
        }
        if caps.multi_touch && self.control.contains(&Some(sample.finger_id)) {
            self.apply_transform(ctx, caps, sample.finger_id);
        }
        paint(ctx, previous, sample.point);
        self.emit_touch(ctx, sample.finger_id);
    }

    fn removed(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, sample: &TouchSample) {
        if !self.fingers.contains_key(&sample.finger_id) {
            return;
        }
        if self.tappable && self.fingers.len() == 1 {
            self.tappable = false;
            self.fire_tap(ctx, caps, sample.point, sample.time);
        }

        let swipe = if self.fingers.len() == 1 && caps.swipe {
            self.swipe_vector(ctx.settings, sample.time)
        } else {
            None
        };
        self.finish_finger(ctx, caps, sample);
        if let Some(vector) = swipe {
            ctx.emit(GestureKind::Swipe(vector));
        }
    }

    /// Drop a finger, report it and re-select or reset the control fingers.
    fn finish_finger(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, sample: &TouchSample) {
        let Some(mut info) = self.fingers.remove(&sample.finger_id) else {
            return;
        };
        info.phase = TouchPhase::Removed;
        info.delta = sample.point - info.current_point;
        info.current_point = sample.point;
        info.finger_count = self.fingers.len();
        ctx.emit(GestureKind::Touch(self.decorate(info)));

        if self.fingers.is_empty() {
            self.reset_anchor(ctx);
            self.control = [None, None];
            self.swipe_finger = None;
            self.swipe_queue.clear();
        } else {
            self.select_control(ctx, caps);
        }
    }

    fn fire_tap(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, point: Point, time: f64) {
        if caps.tap && !caps.double_tap {
            ctx.emit(GestureKind::Tap(point));
            self.pending_tap = None;
            return;
        }
        match self.pending_tap.take() {
            Some((_, first)) if time - first <= ctx.settings.double_tap_time => {
                ctx.emit(GestureKind::DoubleTap(point));
            }
            expired => {
                // The per-frame check may not have run yet.
                if let Some((first_point, _)) = expired {
                    ctx.emit(GestureKind::Tap(first_point));
                }
                self.pending_tap = Some((point, time));
            }
        }
    }

    /// Fire a pending single tap whose double-tap window has elapsed.
    pub fn update(&mut self, ctx: &mut GestureContext<'_>, now: f64) {
        let Some((point, time)) = self.pending_tap else {
            return;
        };
        if now - time > ctx.settings.double_tap_time {
            self.pending_tap = None;
            ctx.emit(GestureKind::Tap(point));
        }
    }

    fn push_swipe(&mut self, settings: &TouchSettings, sample: &TouchSample) {
        self.swipe_queue.push_back((sample.point, sample.time));
        while self.swipe_queue.len() > settings.swipe_queue_size {
            self.swipe_queue.pop_front();
        }
    }

    /// Average per-sample displacement when the queued motion was a swipe.
    fn swipe_vector(&self, settings: &TouchSettings, now: f64) -> Option<Vec2> {
        let samples = self.swipe_queue.len();
        if samples < settings.swipe_queue_size.max(2) {
            return None;
        }
        let (first, first_time) = *self.swipe_queue.front()?;
        let (last, _) = *self.swipe_queue.back()?;
        let average = (last - first) / (samples - 1) as f64;
        let speed = average.hypot() * settings.frame_rate;
        let fast = speed >= settings.swipe_min_velocity;
        let short = now - first_time < settings.swipe_max_time;
        (fast && short).then_some(average)
    }

    /// Choose the control fingers: the only finger, or the farthest-apart pair.
    fn select_control(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities) {
        if !caps.multi_touch {
            return;
        }
        for info in self.fingers.values_mut() {
            info.active = false;
        }

        let ids: Vec<FingerId> = self.fingers.keys().copied().collect();
        let pair = match ids.as_slice() {
            [] => return,
            [only] => [Some(*only), None],
            _ => {
                let mut best = None;
                let mut spread = 0.0;
                for (i, a) in ids.iter().enumerate() {
                    for b in &ids[i + 1..] {
                        let distance = self.fingers[a].current_point.distance(self.fingers[b].current_point);
                        if distance > spread {
                            spread = distance;
                            best = Some((*a, *b));
                        }
                    }
                }
                match best {
                    Some((a, b)) if spread >= SPREAD_EPSILON => [Some(a), Some(b)],
                    _ => return,
                }
            }
        };
        self.control = pair;

        for id in pair.into_iter().flatten() {
            if let Some(info) = self.fingers.get_mut(&id) {
                info.active = true;
                info.start_point = info.current_point;
            }
        }
        if let Some(first) = pair[0].and_then(|id| self.fingers.get(&id)) {
            let point = first.start_point;
            self.anchor_to(ctx, caps, point);
        }
        if let Some(node) = ctx.graph.node(ctx.node) {
            self.start_position = node.position();
            self.start_rotation = node.rotation();
            self.start_scale = node.scale();
        }
        self.start_distance = 0.0;
        self.current_distance = 0.0;
        self.current_scale = 1.0;
        self.current_angle = 0.0;
    }

    /// Move the node's center under `global` without moving the node on screen.
    fn anchor_to(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, global: Point) {
        if !caps.constraints.any() {
            return;
        }
        let Some(local) = ctx.graph.global_to_local(ctx.node, global) else {
            return;
        };
        let Some(node) = ctx.graph.node_mut(ctx.node) else {
            return;
        };
        let size = node.size();
        if size.width <= 0.0 || size.height <= 0.0 {
            return;
        }
        self.anchor = Point::new(local.x / size.width, local.y / size.height);
        if self.start_anchor.is_none() {
            self.start_anchor = Some(node.center());
        }
        shift_center(node, self.anchor);
    }

    /// Put the center back where it was before the gesture.
    fn reset_anchor(&mut self, ctx: &mut GestureContext<'_>) {
        let Some(start) = self.start_anchor.take() else {
            return;
        };
        if let Some(node) = ctx.graph.node_mut(ctx.node) {
            shift_center(node, start);
        }
        self.anchor = start;
    }

    fn apply_transform(&mut self, ctx: &mut GestureContext<'_>, caps: TouchCapabilities, moved: FingerId) {
        let Some(first) = self.control[0].and_then(|id| self.fingers.get(&id)).copied() else {
            return;
        };
        let second = self.control[1].and_then(|id| self.fingers.get(&id)).copied();

        // Translation is measured in the parent's space so the node's own
        // rotation and scale do not distort it.
        let parent = ctx.graph.node(ctx.node).and_then(Node::parent);
        let to_parent = match parent.and_then(|p| ctx.graph.global_transform(p)) {
            Some(transform) if transform.determinant().abs() > f64::EPSILON => transform.inverse(),
            Some(_) => return,
            None => Affine::IDENTITY,
        };
        let offset = to_parent * first.current_point - to_parent * first.start_point;

        if let Some(second) = second {
            let floor = ctx.settings.min_touch_distance;
            self.start_distance = first.start_point.distance(second.start_point).max(floor);
            self.current_distance = first.current_point.distance(second.current_point).max(floor);
            self.current_scale = self.current_distance / self.start_distance;
            self.current_angle =
                (second.start_point - first.start_point).atan2() - (second.current_point - first.current_point).atan2();
        }

        let Some(node) = ctx.graph.node_mut(ctx.node) else {
            return;
        };
        if second.is_some() {
            if caps.constraints.scale {
                node.set_scale(self.start_scale * self.current_scale);
            }
            if caps.constraints.rotate {
                node.set_rotation(self.start_rotation - self.current_angle.to_degrees());
            }
        }
        if moved == first.finger_id && caps.constraints.any() {
            let mut delta = Vec2::ZERO;
            if !self.tappable && caps.constraints.position_x {
                delta.x = offset.x;
            }
            if !self.tappable && caps.constraints.position_y {
                delta.y = offset.y;
            }
            node.set_position(self.start_position + delta);
        }
    }

    /// Attach the pinch quantities, once two control fingers exist.
    fn decorate(&self, mut info: TouchInfo) -> TouchInfo {
        if self.control[1].is_none() {
            return info;
        }
        info.start_distance = self.start_distance;
        info.current_distance = self.current_distance;
        info.current_scale = self.current_scale;
        info.current_angle = self.current_angle;
        info
    }

    fn emit_touch(&self, ctx: &mut GestureContext<'_>, finger: FingerId) {
        if let Some(info) = self.fingers.get(&finger) {
            let mut info = self.decorate(*info);
            info.finger_count = self.fingers.len();
            ctx.emit(GestureKind::Touch(info));
        }
    }
}

/// Change the center, moving the node so its content stays in place.
fn shift_center(node: &mut Node, center: Point) {
    let size = node.size();
    let scale = node.scale();
    let current = node.center();
    let local = Point::new(
        (center.x - current.x) * size.width * scale.x,
        (center.y - current.y) * size.height * scale.y,
    );
    let offset = (Affine::rotate(node.rotation().to_radians()) * local).to_vec2();
    node.set_center(center);
    node.move_by(offset);
}

/// Queue a stroke segment on drawing canvases, in the canvas' local space.
fn paint(ctx: &mut GestureContext<'_>, from: Point, to: Point) {
    let is_canvas = ctx
        .graph
        .node(ctx.node)
        .is_some_and(|node| node.kind().as_canvas().is_some());
    if !is_canvas {
        return;
    }
    let (Some(from), Some(to)) = (
        ctx.graph.global_to_local(ctx.node, from),
        ctx.graph.global_to_local(ctx.node, to),
    ) else {
        return;
    };
    if let Some(canvas) = ctx.graph.node_mut(ctx.node).and_then(|n| n.kind_mut().as_canvas_mut()) {
        canvas.push_stroke(from, to);
    }
}

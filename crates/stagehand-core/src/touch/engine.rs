use super::gesture::{GestureContext, GestureState};
use super::info::{FingerId, GestureEvent, TouchPhase, TouchSample};
use crate::scene::{NodeId, SceneGraph};
use crate::settings::TouchSettings;
use std::collections::HashMap;

/// Routes raw touch samples to nodes and runs their gesture state machines.
///
/// A finger is pinned to the node it first lands on: an `Added` sample hit
/// tests the scene, later phases of the same finger go to that node wherever
/// the finger moves. Events accumulate until [`poll_events`](Self::poll_events).
#[derive(Debug, Default)]
pub struct TouchEngine {
    settings: TouchSettings,
    states: HashMap<NodeId, GestureState>,
    routes: HashMap<FingerId, NodeId>,
    events: Vec<GestureEvent>,
}

impl TouchEngine {
    pub fn new(settings: TouchSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &TouchSettings {
        &self.settings
    }

    /// Fingers currently pinned to a node.
    pub fn active_fingers(&self) -> usize {
        self.routes.len()
    }

    /// Node a finger is pinned to.
    pub fn route(&self, finger: FingerId) -> Option<NodeId> {
        self.routes.get(&finger).copied()
    }

    /// Current control fingers of `node`, if it is tracking a gesture.
    pub fn control_fingers(&self, node: NodeId) -> Option<[Option<FingerId>; 2]> {
        self.states.get(&node).map(GestureState::control_fingers)
    }

    pub fn handle_samples(&mut self, graph: &mut SceneGraph, samples: impl IntoIterator<Item = TouchSample>) {
        for sample in samples {
            self.handle_sample(graph, sample);
        }
    }

    /// Route one raw sample. Samples for fingers that were never added, or
    /// that landed on nothing, are ignored.
    pub fn handle_sample(&mut self, graph: &mut SceneGraph, sample: TouchSample) {
        let node = match sample.phase {
            TouchPhase::Added => {
                if self.routes.contains_key(&sample.finger_id) {
                    log::debug!("Finger {} added twice", sample.finger_id);
                    return;
                }
                let Some(node) = graph.hit_test(sample.point) else {
                    return;
                };
                self.routes.insert(sample.finger_id, node);
                node
            }
            TouchPhase::Moved => match self.routes.get(&sample.finger_id) {
                Some(&node) => node,
                None => return,
            },
            TouchPhase::Removed => match self.routes.remove(&sample.finger_id) {
                Some(node) => node,
                None => return,
            },
        };
        self.process(graph, node, &sample);
    }

    /// Feed a sample straight to `node`'s gesture state, bypassing routing.
    pub fn process(&mut self, graph: &mut SceneGraph, node: NodeId, sample: &TouchSample) {
        if !graph.contains_node(node) {
            self.forget_node(node);
            return;
        }
        let state = self.states.entry(node).or_default();
        let mut ctx = GestureContext {
            graph,
            node,
            settings: &self.settings,
            events: &mut self.events,
        };
        state.process(&mut ctx, sample);
        let finished = state.is_idle() && !state.has_pending_tap();
        if finished {
            self.states.remove(&node);
        }
    }

    /// Per-frame bookkeeping: fire single taps whose double-tap window ran out.
    pub fn update(&mut self, graph: &mut SceneGraph, now: f64) {
        self.states.retain(|node, _| graph.contains_node(*node));
        for (&node, state) in self.states.iter_mut() {
            let ready = graph
                .node(node)
                .is_some_and(|n| n.is_visible() && n.is_enabled() && n.touch.double_tap);
            if !ready {
                continue;
            }
            let mut ctx = GestureContext {
                graph: &mut *graph,
                node,
                settings: &self.settings,
                events: &mut self.events,
            };
            state.update(&mut ctx, now);
        }
        self.states.retain(|_, state| !state.is_idle() || state.has_pending_tap());
    }

    /// Drop all gesture state of a node, e.g. after it was destroyed.
    pub fn forget_node(&mut self, node: NodeId) {
        self.states.remove(&node);
        self.routes.retain(|_, routed| *routed != node);
    }

    /// Take every event emitted since the last call.
    pub fn poll_events(&mut self) -> Vec<GestureEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{DrawingCanvas, NodeKind};
    use crate::touch::{GestureKind, TouchCapabilities};
    use kurbo::{Point, Size, Vec2};

    const FRAME: f64 = 1.0 / 60.0;

    fn scene(caps: TouchCapabilities) -> (SceneGraph, NodeId) {
        let mut graph = SceneGraph::new(Size::new(1920.0, 1080.0));
        let id = graph.create_child(graph.root(), NodeKind::Plain).unwrap();
        let node = graph.node_mut(id).unwrap();
        node.set_position(Point::new(100.0, 100.0));
        node.set_size(Size::new(400.0, 400.0));
        node.set_enabled(true);
        node.touch = caps;
        (graph, id)
    }

    fn gestures(events: Vec<GestureEvent>) -> Vec<GestureKind> {
        events
            .into_iter()
            .map(|e| e.kind)
            .filter(|k| !matches!(k, GestureKind::Touch(_)))
            .collect()
    }

    fn tap_at(engine: &mut TouchEngine, graph: &mut SceneGraph, point: Point, time: f64) {
        engine.handle_sample(graph, TouchSample::added(1, point, time));
        engine.handle_sample(graph, TouchSample::removed(1, point, time + 0.05));
    }

    fn assert_point_eq(a: Point, b: Point) {
        assert!((a - b).hypot() < 1e-6, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_control_pair_is_farthest_apart() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        graph.node_mut(id).unwrap().set_position(Point::new(-100.0, -100.0));
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(0.0, 0.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(2, Point::new(10.0, 0.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(3, Point::new(0.0, 10.0), 0.0));

        assert_eq!(engine.control_fingers(id), Some([Some(2), Some(3)]));
    }

    #[test]
    fn test_single_finger_drag() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();
        let grabbed = Point::new(50.0, 50.0);

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(1, Point::new(180.0, 170.0), FRAME));

        assert_point_eq(graph.local_to_global(id, grabbed).unwrap(), Point::new(180.0, 170.0));

        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(180.0, 170.0), 2.0 * FRAME));
        let node = graph.node(id).unwrap();
        assert_eq!(node.center(), Point::ZERO);
        assert_point_eq(node.position(), Point::new(130.0, 120.0));
    }

    #[test]
    fn test_pinch_scales_around_first_finger() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();
        let grabbed = Point::new(50.0, 50.0);

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(2, Point::new(250.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(2, Point::new(350.0, 150.0), FRAME));

        let node = graph.node(id).unwrap();
        assert!((node.scale() - Vec2::new(2.0, 2.0)).hypot() < 1e-9);
        assert!(node.rotation().abs() < 1e-9);
        assert_point_eq(graph.local_to_global(id, grabbed).unwrap(), Point::new(150.0, 150.0));
    }

    #[test]
    fn test_rotate_and_release_restores_center() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();
        let grabbed = Point::new(50.0, 50.0);

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(2, Point::new(250.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(2, Point::new(150.0, 250.0), FRAME));

        assert!((graph.node(id).unwrap().rotation() - 90.0).abs() < 1e-9);

        engine.handle_sample(&mut graph, TouchSample::removed(2, Point::new(150.0, 250.0), 2.0 * FRAME));
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(150.0, 150.0), 3.0 * FRAME));

        assert_eq!(graph.node(id).unwrap().center(), Point::ZERO);
        assert_point_eq(graph.local_to_global(id, grabbed).unwrap(), Point::new(150.0, 150.0));
        assert_eq!(engine.active_fingers(), 0);
        assert!(engine.control_fingers(id).is_none());
    }

    #[test]
    fn test_constraints_limit_transform() {
        let mut caps = TouchCapabilities::manipulable();
        caps.constraints.rotate = false;
        caps.constraints.position_y = false;
        let (mut graph, id) = scene(caps);
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(2, Point::new(250.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(2, Point::new(150.0, 250.0), FRAME));
        assert_eq!(graph.node(id).unwrap().rotation(), 0.0);

        engine.handle_sample(&mut graph, TouchSample::removed(2, Point::new(150.0, 250.0), FRAME));
        let before = graph.node(id).unwrap().position();
        engine.handle_sample(&mut graph, TouchSample::moved(1, Point::new(190.0, 190.0), 2.0 * FRAME));
        let after = graph.node(id).unwrap().position();
        assert!((after.x - before.x - 40.0).abs() < 1e-9);
        assert!((after.y - before.y).abs() < 1e-9);
    }

    fn swipe(speed: f64) -> Vec<GestureKind> {
        let caps = TouchCapabilities {
            swipe: true,
            ..Default::default()
        };
        let (mut graph, _) = scene(caps);
        let mut engine = TouchEngine::default();
        let start = Point::new(150.0, 300.0);

        engine.handle_sample(&mut graph, TouchSample::added(7, start, 0.0));
        for step in 1..4 {
            let point = start + Vec2::new(speed * step as f64, 0.0);
            engine.handle_sample(&mut graph, TouchSample::moved(7, point, step as f64 * FRAME));
        }
        let end = start + Vec2::new(speed * 3.0, 0.0);
        engine.handle_sample(&mut graph, TouchSample::removed(7, end, 4.0 * FRAME));
        gestures(engine.poll_events())
    }

    #[test]
    fn test_swipe_fires_once_above_threshold() {
        // 20 px per sample at 60 Hz is 1200 px/s.
        assert_eq!(swipe(20.0), vec![GestureKind::Swipe(Vec2::new(20.0, 0.0))]);
    }

    #[test]
    fn test_swipe_half_speed_does_not_fire() {
        assert!(swipe(10.0).is_empty());
    }

    #[test]
    fn test_slow_release_is_not_a_swipe() {
        let caps = TouchCapabilities {
            swipe: true,
            ..Default::default()
        };
        let (mut graph, _) = scene(caps);
        let mut engine = TouchEngine::default();
        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(110.0, 110.0), 0.0));
        for step in 1..4 {
            let point = Point::new(110.0 + 30.0 * step as f64, 110.0);
            engine.handle_sample(&mut graph, TouchSample::moved(1, point, step as f64 * FRAME));
        }
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(200.0, 110.0), 2.0));

        assert!(gestures(engine.poll_events()).is_empty());
    }

    fn double_tap_scene() -> (SceneGraph, NodeId) {
        scene(TouchCapabilities {
            tap: true,
            double_tap: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_double_tap_within_window() {
        let (mut graph, _) = double_tap_scene();
        let mut engine = TouchEngine::default();
        let point = Point::new(200.0, 200.0);

        tap_at(&mut engine, &mut graph, point, 0.0);
        engine.update(&mut graph, 0.1);
        tap_at(&mut engine, &mut graph, point, 0.1);
        engine.update(&mut graph, 1.0);

        assert_eq!(gestures(engine.poll_events()), vec![GestureKind::DoubleTap(point)]);
    }

    #[test]
    fn test_taps_beyond_window_are_single() {
        let (mut graph, _) = double_tap_scene();
        let mut engine = TouchEngine::default();
        let point = Point::new(200.0, 200.0);

        tap_at(&mut engine, &mut graph, point, 0.0);
        engine.update(&mut graph, 0.5);
        tap_at(&mut engine, &mut graph, point, 1.0);
        engine.update(&mut graph, 2.0);

        assert_eq!(
            gestures(engine.poll_events()),
            vec![GestureKind::Tap(point), GestureKind::Tap(point)]
        );
    }

    #[test]
    fn test_expired_tap_flushed_without_update() {
        let (mut graph, _) = double_tap_scene();
        let mut engine = TouchEngine::default();
        let first = Point::new(200.0, 200.0);
        let second = Point::new(210.0, 200.0);

        tap_at(&mut engine, &mut graph, first, 0.0);
        tap_at(&mut engine, &mut graph, second, 1.0);

        assert_eq!(gestures(engine.poll_events()), vec![GestureKind::Tap(first)]);
        engine.update(&mut graph, 2.0);
        assert_eq!(gestures(engine.poll_events()), vec![GestureKind::Tap(second)]);
    }

    #[test]
    fn test_single_tap_fires_immediately() {
        let (mut graph, _) = scene(TouchCapabilities::tappable());
        let mut engine = TouchEngine::default();
        let point = Point::new(200.0, 200.0);

        tap_at(&mut engine, &mut graph, point, 0.0);

        assert_eq!(gestures(engine.poll_events()), vec![GestureKind::Tap(point)]);
    }

    #[test]
    fn test_movement_or_second_finger_cancels_tap() {
        let (mut graph, _) = scene(TouchCapabilities::tappable());
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(200.0, 200.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(1, Point::new(230.0, 200.0), FRAME));
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(200.0, 200.0), 2.0 * FRAME));

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(200.0, 200.0), 1.0));
        engine.handle_sample(&mut graph, TouchSample::added(2, Point::new(300.0, 200.0), 1.0));
        engine.handle_sample(&mut graph, TouchSample::removed(2, Point::new(300.0, 200.0), 1.05));
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(200.0, 200.0), 1.1));

        assert!(gestures(engine.poll_events()).is_empty());
    }

    #[test]
    fn test_unknown_fingers_are_ignored() {
        let (mut graph, _) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::moved(4, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::removed(4, Point::new(150.0, 150.0), 0.0));
        // Lands outside every enabled node.
        engine.handle_sample(&mut graph, TouchSample::added(5, Point::new(1500.0, 900.0), 0.0));

        assert!(engine.poll_events().is_empty());
        assert_eq!(engine.active_fingers(), 0);
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(160.0, 150.0), 0.0));

        assert_eq!(engine.poll_events().len(), 1);
        assert_eq!(engine.control_fingers(id), Some([Some(1), None]));
    }

    #[test]
    fn test_disabled_mid_gesture_finishes_gracefully() {
        let (mut graph, id) = double_tap_scene();
        graph.node_mut(id).unwrap().touch.multi_touch = true;
        graph.node_mut(id).unwrap().touch.constraints = crate::touch::MultiTouchConstraints::ALL;
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        graph.node_mut(id).unwrap().set_enabled(false);
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(150.0, 150.0), 0.05));
        engine.update(&mut graph, 1.0);

        let events = engine.poll_events();
        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(GestureKind::Touch(info)) if info.phase == TouchPhase::Removed
        ));
        assert!(gestures(events).is_empty());
        assert!(engine.control_fingers(id).is_none());
        assert_eq!(graph.node(id).unwrap().center(), Point::ZERO);
    }

    #[test]
    fn test_destroyed_node_drops_state() {
        let (mut graph, id) = scene(TouchCapabilities::manipulable());
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(150.0, 150.0), 0.0));
        graph.remove(id).unwrap();
        engine.handle_sample(&mut graph, TouchSample::moved(1, Point::new(160.0, 150.0), FRAME));
        engine.handle_sample(&mut graph, TouchSample::removed(1, Point::new(160.0, 150.0), FRAME));

        assert!(engine.control_fingers(id).is_none());
        assert_eq!(engine.active_fingers(), 0);
    }

    #[test]
    fn test_canvas_collects_local_strokes() {
        let mut graph = SceneGraph::new(Size::new(1920.0, 1080.0));
        let id = graph
            .create_child(graph.root(), NodeKind::DrawingCanvas(DrawingCanvas::new("brush.png")))
            .unwrap();
        let node = graph.node_mut(id).unwrap();
        node.set_position(Point::new(100.0, 100.0));
        node.set_size(Size::new(400.0, 400.0));
        node.set_enabled(true);
        let mut engine = TouchEngine::default();

        engine.handle_sample(&mut graph, TouchSample::added(1, Point::new(110.0, 120.0), 0.0));
        engine.handle_sample(&mut graph, TouchSample::moved(1, Point::new(130.0, 120.0), FRAME));

        let canvas = graph.node_mut(id).unwrap().kind_mut().as_canvas_mut().unwrap();
        let strokes = canvas.take_strokes();
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[1].from, Point::new(10.0, 20.0));
        assert_eq!(strokes[1].to, Point::new(30.0, 20.0));
    }
}

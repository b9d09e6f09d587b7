//! Interactive camera with settle notifications.
//!
//! The [`ViewportManager`] owns the camera and a small motion state machine:
//!
//! ```text
//!            pointer_down                     move_to(d > 0)
//!   Idle ─────────────────► Dragging    Idle ───────────────► Animating
//!    ▲                         │          ▲                       │
//!    └──── pointer_up ─────────┘          └── advance() done ─────┘
//!          (settles if moved)                  (settles)
//! ```
//!
//! Whenever the camera comes to rest the manager computes the query
//! rectangle (visible area grown by one extent on every side), publishes
//! [`BusMessage::Settled`] and hands the rectangle back to the caller.

mod animation;
mod camera;

pub use animation::{ease_in_out_cubic, Transition};
pub use camera::Camera;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::bus::{BusMessage, EventBus};
use crate::geometry::{Point, Rect, Size};

/// Default lower zoom bound (pixels per world unit).
pub const DEFAULT_MIN_ZOOM: f64 = 0.05;

/// Default upper zoom bound.
pub const DEFAULT_MAX_ZOOM: f64 = 20.0;

/// Default initial zoom.
pub const DEFAULT_INITIAL_ZOOM: f64 = 1.0;

/// Default duration of a locate transition.
pub const DEFAULT_LOCATE_DURATION_MS: u64 = 800;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewportError {
    /// The camera is being dragged; programmatic moves are refused.
    #[error("Viewport is being dragged")]
    Dragging,

    /// The camera is animating; manual pans are refused.
    #[error("Viewport is animating")]
    Animating,

    /// Zoom factor must be finite and positive.
    #[error("Invalid zoom factor {0}")]
    InvalidZoomFactor(String),

    /// Target or delta contains NaN or infinity.
    #[error("Non-finite coordinate")]
    NonFinite,
}

/// Camera bounds and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub initial_zoom: f64,
    pub initial_center: Point,
    /// Duration used when locating an entity from the bus.
    pub locate_duration: Duration,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            initial_zoom: DEFAULT_INITIAL_ZOOM,
            initial_center: Point::ZERO,
            locate_duration: Duration::from_millis(DEFAULT_LOCATE_DURATION_MS),
        }
    }
}

impl ViewportConfig {
    pub fn with_zoom_bounds(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom.max(min_zoom);
        self
    }

    pub fn with_initial_zoom(mut self, zoom: f64) -> Self {
        self.initial_zoom = zoom;
        self
    }

    pub fn with_initial_center(mut self, center: Point) -> Self {
        self.initial_center = center;
        self
    }

    pub fn with_locate_duration(mut self, duration: Duration) -> Self {
        self.locate_duration = duration;
        self
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}

/// Motion state of the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportState {
    Idle,
    Dragging {
        /// Last pointer position.
        last: Point,
        /// Whether the pointer moved since the press.
        moved: bool,
    },
    Animating(Transition),
}

/// Camera plus motion state machine.
pub struct ViewportManager {
    config: ViewportConfig,
    camera: Camera,
    state: ViewportState,
    bus: Arc<EventBus>,
}

impl ViewportManager {
    pub fn new(config: ViewportConfig, screen: Size, bus: Arc<EventBus>) -> Self {
        let camera = Camera::new(
            config.initial_center,
            config.clamp_zoom(config.initial_zoom),
            screen,
        );
        Self {
            config,
            camera,
            state: ViewportState::Idle,
            bus,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn zoom(&self) -> f64 {
        self.camera.zoom
    }

    pub fn center(&self) -> Point {
        self.camera.center
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ViewportState::Idle)
    }

    /// Current query rectangle.
    pub fn query_rect(&self) -> Rect {
        self.camera.query_rect()
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.camera.world_to_screen(world)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.camera.screen_to_world(screen)
    }

    /// Publish the current query rectangle and return it.
    pub fn settle(&self) -> Rect {
        let rect = self.camera.query_rect();
        debug!(center = %self.camera.center, zoom = self.camera.zoom, %rect, "Viewport settled");
        self.bus.publish(BusMessage::Settled { rect });
        rect
    }

    /// Pan by a screen-space delta.
    ///
    /// Settles when idle. During a drag the move is applied without settling;
    /// the release will settle.
    pub fn pan(&mut self, delta: Point) -> Result<Option<Rect>, ViewportError> {
        if !delta.is_finite() {
            return Err(ViewportError::NonFinite);
        }
        match self.state {
            ViewportState::Animating(_) => Err(ViewportError::Animating),
            ViewportState::Dragging { .. } => {
                self.camera.pan_screen(delta);
                Ok(None)
            }
            ViewportState::Idle => {
                self.camera.pan_screen(delta);
                Ok(Some(self.settle()))
            }
        }
    }

    /// Multiply the zoom by `factor`, keeping the world point under `anchor`
    /// fixed on screen. The result is clamped to the configured bounds.
    ///
    /// Cancels a running animation. Settles unless a drag is in progress.
    pub fn zoom_by(&mut self, factor: f64, anchor: Point) -> Result<Option<Rect>, ViewportError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(ViewportError::InvalidZoomFactor(factor.to_string()));
        }
        if !anchor.is_finite() {
            return Err(ViewportError::NonFinite);
        }

        let new_zoom = self.config.clamp_zoom(self.camera.zoom * factor);
        trace!(factor, from = self.camera.zoom, to = new_zoom, "Zoom");
        self.camera.zoom_at(new_zoom, anchor);

        match self.state {
            ViewportState::Dragging { .. } => Ok(None),
            ViewportState::Animating(_) | ViewportState::Idle => {
                self.state = ViewportState::Idle;
                Ok(Some(self.settle()))
            }
        }
    }

    /// Travel to `target` over `duration` with cubic easing.
    ///
    /// A zero duration jumps and settles immediately. While animating, the
    /// transition restarts from the current position towards the new target.
    pub fn move_to(&mut self, target: Point, duration: Duration) -> Result<Option<Rect>, ViewportError> {
        if !target.is_finite() {
            return Err(ViewportError::NonFinite);
        }
        if matches!(self.state, ViewportState::Dragging { .. }) {
            return Err(ViewportError::Dragging);
        }

        if duration.is_zero() {
            self.camera.center = target;
            self.state = ViewportState::Idle;
            return Ok(Some(self.settle()));
        }

        debug!(from = %self.camera.center, to = %target, ?duration, "Move started");
        self.state = ViewportState::Animating(Transition::new(self.camera.center, target, duration));
        Ok(None)
    }

    /// Advance a running animation by `dt`. Returns the query rectangle when
    /// the animation completes.
    pub fn advance(&mut self, dt: Duration) -> Option<Rect> {
        let ViewportState::Animating(mut transition) = self.state else {
            return None;
        };

        self.camera.center = transition.advance(dt);
        if transition.is_finished() {
            self.state = ViewportState::Idle;
            Some(self.settle())
        } else {
            self.state = ViewportState::Animating(transition);
            None
        }
    }

    /// Begin a drag at a screen point. Cancels a running animation.
    pub fn pointer_down(&mut self, screen: Point) {
        self.state = ViewportState::Dragging {
            last: screen,
            moved: false,
        };
    }

    /// Drag to a screen point; ignored unless dragging.
    pub fn pointer_move(&mut self, screen: Point) {
        if let ViewportState::Dragging { last, .. } = self.state {
            let delta = screen - last;
            if delta == Point::ZERO || !delta.is_finite() {
                return;
            }
            self.camera.pan_screen(delta);
            self.state = ViewportState::Dragging {
                last: screen,
                moved: true,
            };
        }
    }

    /// End a drag. Settles if the pointer moved during the drag.
    pub fn pointer_up(&mut self, screen: Point) -> Option<Rect> {
        self.pointer_move(screen);
        let ViewportState::Dragging { moved, .. } = self.state else {
            return None;
        };
        self.state = ViewportState::Idle;
        moved.then(|| self.settle())
    }

    /// Change the screen size. Settles when idle, since the visible area
    /// changed.
    pub fn resize(&mut self, screen: Size) -> Option<Rect> {
        if screen.is_degenerate() {
            return None;
        }
        self.camera.screen = screen;
        self.is_idle().then(|| self.settle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Topic;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn manager() -> (ViewportManager, Arc<Mutex<Vec<Rect>>>) {
        let bus = Arc::new(EventBus::new());
        let settled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&settled);
        bus.subscribe(Topic::Settled, move |msg| {
            if let BusMessage::Settled { rect } = msg {
                sink.lock().push(*rect);
            }
        });
        let config = ViewportConfig::default().with_zoom_bounds(0.5, 8.0);
        (
            ViewportManager::new(config, Size::new(800.0, 600.0), bus),
            settled,
        )
    }

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
    }

    #[test]
    fn test_pan_idle_settles_and_publishes() {
        let (mut vp, settled) = manager();
        let rect = vp.pan(Point::new(100.0, 0.0)).unwrap().unwrap();

        assert_eq!(vp.center(), Point::new(-100.0, 0.0));
        assert_eq!(*settled.lock(), vec![rect]);
        assert_eq!(rect, vp.query_rect());
    }

    #[test]
    fn test_pan_rejected_while_animating() {
        let (mut vp, _) = manager();
        vp.move_to(Point::new(50.0, 50.0), Duration::from_millis(100))
            .unwrap();
        assert_eq!(vp.pan(Point::new(1.0, 1.0)), Err(ViewportError::Animating));
    }

    #[test]
    fn test_zoom_clamps_to_bounds() {
        let (mut vp, _) = manager();
        vp.zoom_by(100.0, Point::new(400.0, 300.0)).unwrap();
        assert_eq!(vp.zoom(), 8.0);
        vp.zoom_by(1e-6, Point::new(400.0, 300.0)).unwrap();
        assert_eq!(vp.zoom(), 0.5);
    }

    #[test]
    fn test_zoom_rejects_bad_factor() {
        let (mut vp, _) = manager();
        assert!(matches!(
            vp.zoom_by(0.0, Point::ZERO),
            Err(ViewportError::InvalidZoomFactor(_))
        ));
        assert!(vp.zoom_by(f64::NAN, Point::ZERO).is_err());
    }

    #[test]
    fn test_zoom_cancels_animation() {
        let (mut vp, settled) = manager();
        vp.move_to(Point::new(500.0, 0.0), Duration::from_secs(1))
            .unwrap();
        vp.advance(Duration::from_millis(100));

        assert!(vp.zoom_by(2.0, Point::new(400.0, 300.0)).unwrap().is_some());
        assert!(vp.is_idle());
        assert!(vp.advance(Duration::from_secs(5)).is_none());
        assert_eq!(settled.lock().len(), 1);
    }

    #[test]
    fn test_move_to_zero_duration_jumps() {
        let (mut vp, settled) = manager();
        let rect = vp
            .move_to(Point::new(30.0, 40.0), Duration::ZERO)
            .unwrap()
            .unwrap();
        assert_eq!(vp.center(), Point::new(30.0, 40.0));
        assert_eq!(rect.center(), Point::new(30.0, 40.0));
        assert_eq!(settled.lock().len(), 1);
    }

    #[test]
    fn test_move_to_animates_and_settles_once() {
        let (mut vp, settled) = manager();
        let target = Point::new(1000.0, -500.0);
        assert_eq!(vp.move_to(target, Duration::from_millis(400)).unwrap(), None);

        for _ in 0..3 {
            assert!(vp.advance(Duration::from_millis(100)).is_none());
        }
        assert!(settled.lock().is_empty());

        let rect = vp.advance(Duration::from_millis(100)).unwrap();
        assert_eq!(vp.center(), target);
        assert!(vp.is_idle());
        assert_eq!(*settled.lock(), vec![rect]);
    }

    #[test]
    fn test_move_to_rejected_while_dragging() {
        let (mut vp, _) = manager();
        vp.pointer_down(Point::new(10.0, 10.0));
        assert_eq!(
            vp.move_to(Point::new(1.0, 1.0), Duration::from_millis(100)),
            Err(ViewportError::Dragging)
        );
    }

    #[test]
    fn test_move_to_retargets_from_current_position() {
        let (mut vp, _) = manager();
        vp.move_to(Point::new(100.0, 0.0), Duration::from_millis(200))
            .unwrap();
        vp.advance(Duration::from_millis(100));
        let midway = vp.center();

        vp.move_to(Point::new(-100.0, 0.0), Duration::from_millis(200))
            .unwrap();
        // The new transition starts where the old one was interrupted
        assert_eq!(vp.center(), midway);
        vp.advance(Duration::from_millis(200));
        assert_eq!(vp.center(), Point::new(-100.0, 0.0));
    }

    #[test]
    fn test_drag_settles_on_release_after_movement() {
        let (mut vp, settled) = manager();
        vp.pointer_down(Point::new(100.0, 100.0));
        vp.pointer_move(Point::new(150.0, 100.0));
        vp.pointer_move(Point::new(200.0, 120.0));
        assert!(settled.lock().is_empty());

        let rect = vp.pointer_up(Point::new(200.0, 120.0)).unwrap();
        assert_eq!(vp.center(), Point::new(-100.0, -20.0));
        assert_eq!(*settled.lock(), vec![rect]);
    }

    #[test]
    fn test_click_without_movement_does_not_settle() {
        let (mut vp, settled) = manager();
        vp.pointer_down(Point::new(100.0, 100.0));
        assert!(vp.pointer_up(Point::new(100.0, 100.0)).is_none());
        assert!(vp.is_idle());
        assert!(settled.lock().is_empty());
    }

    #[test]
    fn test_zoom_during_drag_does_not_settle() {
        let (mut vp, settled) = manager();
        vp.pointer_down(Point::new(100.0, 100.0));
        assert_eq!(vp.zoom_by(2.0, Point::new(100.0, 100.0)).unwrap(), None);
        assert!(settled.lock().is_empty());
    }

    #[test]
    fn test_resize_updates_query_rect() {
        let (mut vp, _) = manager();
        let rect = vp.resize(Size::new(400.0, 300.0)).unwrap();
        assert_eq!(rect, Rect::new(-600.0, -450.0, 600.0, 450.0));
        assert!(vp.resize(Size::new(0.0, 300.0)).is_none());
    }

    proptest! {
        #[test]
        fn prop_zoom_keeps_anchor_fixed(
            start_zoom in 0.5f64..8.0,
            factor in 0.01f64..100.0,
            ax in 0.0f64..800.0,
            ay in 0.0f64..600.0,
            cx in -1e4f64..1e4,
            cy in -1e4f64..1e4,
        ) {
            let config = ViewportConfig::default()
                .with_zoom_bounds(0.5, 8.0)
                .with_initial_zoom(start_zoom)
                .with_initial_center(Point::new(cx, cy));
            let mut vp = ViewportManager::new(config, Size::new(800.0, 600.0), Arc::new(EventBus::new()));

            let anchor = Point::new(ax, ay);
            let world = vp.screen_to_world(anchor);
            vp.zoom_by(factor, anchor).unwrap();

            prop_assert!(vp.zoom() >= 0.5 && vp.zoom() <= 8.0);
            prop_assert!(close(vp.world_to_screen(world), anchor));
        }
    }
}

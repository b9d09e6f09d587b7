//! Camera transform between world and screen space.
//!
//! The camera looks at `center` (a world point drawn at the middle of the
//! screen) with `zoom` screen pixels per world unit:
//!
//! ```text
//! screen = (world - center) * zoom + screen_size / 2
//! world  = (screen - screen_size / 2) / zoom + center
//! ```

use crate::geometry::{Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World point at the screen centre.
    pub center: Point,
    /// Screen pixels per world unit.
    pub zoom: f64,
    /// Screen surface size.
    pub screen: Size,
}

impl Camera {
    pub fn new(center: Point, zoom: f64, screen: Size) -> Self {
        Self {
            center,
            zoom,
            screen,
        }
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        (world - self.center) * self.zoom + self.screen.center()
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        (screen - self.screen.center()) / self.zoom + self.center
    }

    /// World rectangle covered by the screen.
    pub fn visible_rect(&self) -> Rect {
        Rect::from_center(
            self.center,
            self.screen.width / self.zoom,
            self.screen.height / self.zoom,
        )
    }

    /// Visible rectangle grown by one extent in every direction, so entities
    /// just off-screen are already reconciled when the user pans.
    pub fn query_rect(&self) -> Rect {
        self.visible_rect().expand_by_extent()
    }

    /// Move the camera so content follows a screen-space drag.
    pub fn pan_screen(&mut self, delta: Point) {
        self.center = self.center - delta / self.zoom;
    }

    /// Change zoom keeping the world point under `anchor` fixed on screen.
    pub fn zoom_at(&mut self, new_zoom: f64, anchor: Point) {
        let pinned = self.screen_to_world(anchor);
        self.zoom = new_zoom;
        self.center = pinned - (anchor - self.screen.center()) / new_zoom;
    }
}

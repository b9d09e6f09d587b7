//! Eased camera transitions.

use std::time::Duration;

use crate::geometry::Point;

/// Cubic ease-in-out on `t ∈ [0, 1]`.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// An in-progress move of the camera centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    from: Point,
    to: Point,
    duration: Duration,
    elapsed: Duration,
}

impl Transition {
    pub fn new(from: Point, to: Point, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
        }
    }

    pub fn target(&self) -> Point {
        self.to
    }

    /// Fraction of the duration elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Current eased position.
    pub fn position(&self) -> Point {
        self.from.lerp(self.to, ease_in_out_cubic(self.progress()))
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Advance by `dt` and return the new position.
    pub fn advance(&mut self, dt: Duration) -> Point {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        if self.is_finished() {
            self.to
        } else {
            self.position()
        }
    }
}

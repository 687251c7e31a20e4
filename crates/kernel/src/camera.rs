use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Follow camera with exponential smoothing toward a tracked point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    position: Vec2,
    target: Vec2,
    /// Follow rate per second. Zero means no smoothing.
    smoothing: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl Camera {
    pub fn new(smoothing: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            target: Vec2::ZERO,
            smoothing: smoothing.max(0.0),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    pub fn track(&mut self, target: Vec2) {
        self.target = target;
    }

    /// Move toward the target.
    pub fn advance(&mut self, dt: f32) {
        if self.smoothing == 0.0 {
            self.position = self.target;
            return;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let alpha = 1.0 - (-self.smoothing * dt).exp();
        self.position += (self.target - self.position) * alpha;
    }

    /// Jump straight to `point`.
    pub fn snap(&mut self, point: Vec2) {
        self.position = point;
        self.target = point;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_approaches_target_without_overshoot() {
        let mut cam = Camera::new(8.0);
        cam.track(Vec2::new(100.0, 0.0));
        let mut last = 0.0;
        for _ in 0..60 {
            cam.advance(1.0 / 60.0);
            assert!(cam.position().x > last && cam.position().x <= 100.0);
            last = cam.position().x;
        }
        assert!((cam.position().x - 100.0).abs() < 0.1);
    }

    #[test]
    fn snap_skips_smoothing() {
        let mut cam = Camera::new(8.0);
        cam.snap(Vec2::new(50.0, 50.0));
        assert_eq!(cam.position(), Vec2::new(50.0, 50.0));
        cam.advance(1.0 / 60.0);
        assert_eq!(cam.position(), Vec2::new(50.0, 50.0));
    }

    #[test]
    fn zero_smoothing_follows_exactly() {
        let mut cam = Camera::new(0.0);
        cam.track(Vec2::new(3.0, 4.0));
        cam.advance(1.0 / 60.0);
        assert_eq!(cam.position(), Vec2::new(3.0, 4.0));
    }
}

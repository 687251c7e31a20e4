use glam::Vec2;
use roomworld_physics::{ContactHandler, PhysicsError, Space, StepParams, StepReport};

use crate::config::WorldConfig;

/// Splits each frame into a fixed number of equal physics sub-steps.
///
/// No lifecycle changes happen between sub-steps; contacts raised in any
/// sub-step only buffer requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsStepper {
    substeps: u32,
    gravity: Vec2,
    damping: f32,
}

impl PhysicsStepper {
    pub fn new(substeps: u32, gravity: Vec2, damping: f32) -> Self {
        Self {
            substeps: substeps.max(1),
            gravity,
            damping,
        }
    }

    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(config.substeps, config.gravity, config.damping)
    }

    pub fn substeps(&self) -> u32 {
        self.substeps
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    /// Advance `space` by `frame_dt`. A zero, negative or non-finite delta
    /// skips the frame's physics entirely.
    pub fn step(
        &self,
        space: &mut Space,
        frame_dt: f32,
        handler: &mut dyn ContactHandler,
    ) -> Result<StepReport, PhysicsError> {
        let mut total = StepReport::default();
        if !(frame_dt.is_finite() && frame_dt > 0.0) {
            tracing::warn!(frame_dt, "skipping physics for invalid frame delta");
            return Ok(total);
        }
        let params = StepParams {
            dt: frame_dt / self.substeps as f32,
            gravity: self.gravity,
            damping: self.damping,
        };
        for _ in 0..self.substeps {
            let report = space.step(&params, handler)?;
            total.began += report.began;
            total.separated += report.separated;
            total.resolved += report.resolved;
        }
        tracing::trace!(substeps = self.substeps, ?total, "physics stepped");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomworld_physics::RigidBody;

    fn fall(substeps: u32, frames: usize) -> Vec2 {
        let mut space = Space::default();
        let body = space.insert_body(RigidBody::dynamic(Vec2::new(0.0, 1000.0), 1.0)).unwrap();
        let stepper = PhysicsStepper::new(substeps, Vec2::new(0.0, -900.0), 0.9);
        for _ in 0..frames {
            stepper.step(&mut space, 1.0 / 60.0, &mut ()).unwrap();
        }
        space.body(body).unwrap().position
    }

    #[test]
    fn doubling_substeps_stays_within_tolerance() {
        for n in [1, 2, 4, 8] {
            let coarse = fall(n, 1);
            let fine = fall(n * 2, 1);
            assert!(
                (coarse - fine).length() < 0.15,
                "n={n}: {coarse} vs {fine}"
            );
        }
        let coarse = fall(4, 30);
        let fine = fall(8, 30);
        assert!((coarse - fine).length() < 1.0, "{coarse} vs {fine}");
    }

    #[test]
    fn invalid_delta_is_skipped() {
        let mut space = Space::default();
        let body = space.insert_body(RigidBody::dynamic(Vec2::ZERO, 1.0)).unwrap();
        let stepper = PhysicsStepper::new(4, Vec2::new(0.0, -900.0), 0.9);
        for dt in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let report = stepper.step(&mut space, dt, &mut ()).unwrap();
            assert_eq!(report, StepReport::default());
        }
        assert_eq!(space.body(body).unwrap().position, Vec2::ZERO);
    }

    #[test]
    fn zero_substeps_is_clamped() {
        assert_eq!(PhysicsStepper::new(0, Vec2::ZERO, 1.0).substeps(), 1);
    }
}

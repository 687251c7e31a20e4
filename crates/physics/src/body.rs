use glam::Vec2;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

/// Handle to a body registered in a [`Space`](crate::Space).
///
/// Handles are never reused within a space, so a stale handle simply fails
/// to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u64);

/// How the solver treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Affected by gravity, forces and contact impulses.
    Dynamic,
    /// Moves with its own velocity; immovable by contacts and gravity.
    Kinematic,
}

/// Rigid body state by value: position, velocity, angle and mass.
///
/// This is what an entity holds while it is outside a space, and what a
/// space hands back when asked for a snapshot. `mass: None` marks a static or
/// kinematic body: it follows its own velocity (zero for static bodies) and
/// never responds to gravity, forces or impulses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
    pub angular_velocity: f32,
    pub mass: Option<f32>,
    /// Force applied over the next sub-step after insertion.
    pub force: Vec2,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            angle: 0.0,
            angular_velocity: 0.0,
            mass: Some(1.0),
            force: Vec2::ZERO,
        }
    }
}

impl RigidBody {
    pub fn dynamic(position: Vec2, mass: f32) -> Self {
        Self {
            position,
            mass: Some(mass),
            ..Self::default()
        }
    }

    /// A body that never moves (terrain, doors).
    pub fn fixed(position: Vec2) -> Self {
        Self {
            position,
            mass: None,
            ..Self::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn kind(&self) -> BodyKind {
        match self.mass {
            Some(m) if m > 0.0 => BodyKind::Dynamic,
            _ => BodyKind::Kinematic,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind() == BodyKind::Dynamic
    }

    /// Inverse mass, zero for non-dynamic bodies.
    pub fn inverse_mass(&self) -> f32 {
        match self.mass {
            Some(m) if m > 0.0 => 1.0 / m,
            _ => 0.0,
        }
    }

    /// Instantaneous velocity change. Ignored by non-dynamic bodies.
    pub fn apply_impulse(&mut self, impulse: Vec2) {
        self.velocity += impulse * self.inverse_mass();
    }

    /// Force applied over the first sub-step after insertion. Ignored by
    /// non-dynamic bodies.
    pub fn apply_force(&mut self, force: Vec2) {
        if self.is_dynamic() {
            self.force += force;
        }
    }

    /// Body state must be finite before it reaches the solver.
    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.angle.is_finite()
            && self.angular_velocity.is_finite()
            && self.force.is_finite()
            && self.mass.is_none_or(f32::is_finite)
    }

    /// Rapier body for this state. Dynamic bodies carry their whole mass on
    /// the body, so their colliders are massless. Rotation is locked because
    /// shapes are axis-aligned.
    pub(crate) fn to_rapier(&self) -> rapier2d::dynamics::RigidBody {
        let builder = match self.kind() {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .additional_mass(self.mass.unwrap_or(1.0))
                .lock_rotations(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
        };
        let mut body = builder
            .translation(to_vector(self.position))
            .rotation(self.angle)
            .linvel(to_vector(self.velocity))
            .angvel(self.angular_velocity)
            .can_sleep(false)
            .build();
        if self.is_dynamic() && self.force != Vec2::ZERO {
            body.add_force(to_vector(self.force), false);
        }
        body
    }

    /// State of a rapier body, keeping the mass the body was inserted with.
    pub(crate) fn from_rapier(body: &rapier2d::dynamics::RigidBody, mass: Option<f32>) -> Self {
        Self {
            position: to_vec2(body.translation()),
            velocity: to_vec2(body.linvel()),
            angle: body.rotation().angle(),
            angular_velocity: body.angvel(),
            mass,
            force: to_vec2(&body.user_force()),
        }
    }
}

pub(crate) fn to_vector(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

pub(crate) fn to_vec2(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_none_is_kinematic() {
        let b = RigidBody::fixed(Vec2::ZERO);
        assert_eq!(b.kind(), BodyKind::Kinematic);
        assert_eq!(b.inverse_mass(), 0.0);
        assert!(b.to_rapier().is_kinematic());
    }

    #[test]
    fn impulse_scales_with_inverse_mass() {
        let mut b = RigidBody::dynamic(Vec2::ZERO, 2.0);
        b.apply_impulse(Vec2::new(4.0, 0.0));
        assert_eq!(b.velocity, Vec2::new(2.0, 0.0));

        let mut wall = RigidBody::fixed(Vec2::ZERO);
        wall.apply_impulse(Vec2::new(4.0, 0.0));
        assert_eq!(wall.velocity, Vec2::ZERO);
    }

    #[test]
    fn rapier_round_trip_keeps_state() {
        let mut b = RigidBody::dynamic(Vec2::new(3.0, -2.0), 2.0).with_velocity(Vec2::X);
        b.apply_force(Vec2::new(0.0, 5.0));
        let rapier = b.to_rapier();
        assert!(rapier.is_dynamic());
        assert_eq!(RigidBody::from_rapier(&rapier, b.mass), b);
    }

    #[test]
    fn non_finite_state_is_invalid() {
        assert!(RigidBody::dynamic(Vec2::ZERO, 1.0).is_valid());
        assert!(!RigidBody::fixed(Vec2::new(f32::NAN, 0.0)).is_valid());
        assert!(!RigidBody::dynamic(Vec2::ZERO, f32::INFINITY).is_valid());
    }
}

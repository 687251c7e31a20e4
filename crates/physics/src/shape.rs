use glam::Vec2;
use rapier2d::prelude::*;
use roomworld_common::{CollisionGroup, LayerMask};
use serde::{Deserialize, Serialize};

use crate::body::{BodyHandle, to_vector};

/// Handle to a shape registered in a [`Space`](crate::Space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeHandle(pub u64);

/// Shape geometry relative to the owning body's position.
///
/// Rects start axis-aligned and turn with the body; dynamic bodies have
/// their rotation locked, so in practice they stay axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Circle { radius: f32, offset: Vec2 },
    Rect { half_extents: Vec2, offset: Vec2 },
}

impl Geometry {
    pub fn circle(radius: f32) -> Self {
        Geometry::Circle {
            radius,
            offset: Vec2::ZERO,
        }
    }

    pub fn rect(width: f32, height: f32) -> Self {
        Geometry::Rect {
            half_extents: Vec2::new(width, height) * 0.5,
            offset: Vec2::ZERO,
        }
    }

    pub fn offset(&self) -> Vec2 {
        match *self {
            Geometry::Circle { offset, .. } | Geometry::Rect { offset, .. } => offset,
        }
    }

    pub fn is_valid(&self) -> bool {
        match *self {
            Geometry::Circle { radius, offset } => {
                radius > 0.0 && radius.is_finite() && offset.is_finite()
            }
            Geometry::Rect {
                half_extents,
                offset,
            } => {
                half_extents.cmpgt(Vec2::ZERO).all()
                    && half_extents.is_finite()
                    && offset.is_finite()
            }
        }
    }
}

/// Description of a shape not yet attached to a space.
///
/// `layers: None` means "use the group's policy mask"; the owner of the space
/// decides what that is before attaching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDesc {
    pub geometry: Geometry,
    pub group: CollisionGroup,
    pub layers: Option<LayerMask>,
    /// Sensors report contacts but never receive a physical response.
    pub sensor: bool,
    pub elasticity: f32,
}

impl ShapeDesc {
    pub fn new(geometry: Geometry, group: CollisionGroup) -> Self {
        Self {
            geometry,
            group,
            layers: None,
            sensor: false,
            elasticity: 0.0,
        }
    }

    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.layers = Some(layers);
        self
    }

    pub fn sensor(mut self) -> Self {
        self.sensor = true;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f32) -> Self {
        self.elasticity = elasticity;
        self
    }
}

/// A shape attached to a body inside a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub body: BodyHandle,
    pub geometry: Geometry,
    pub group: CollisionGroup,
    pub layers: LayerMask,
    pub sensor: bool,
    pub elasticity: f32,
}

impl Shape {
    /// Rapier collider for this shape. The shape handle rides in
    /// `user_data` so contact events map back to shapes.
    pub(crate) fn to_collider(&self, handle: ShapeHandle) -> Collider {
        let builder = match self.geometry {
            Geometry::Circle { radius, .. } => ColliderBuilder::ball(radius),
            Geometry::Rect { half_extents, .. } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y)
            }
        };
        let builder = builder
            .translation(to_vector(self.geometry.offset()))
            .collision_groups(interaction_groups(self.group, self.layers))
            .density(0.0)
            .friction(0.0)
            .restitution(self.elasticity)
            .restitution_combine_rule(CoefficientCombineRule::Multiply)
            .sensor(self.sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(u128::from(handle.0));
        if self.sensor {
            builder.build()
        } else {
            builder.active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS).build()
        }
    }

    /// Back to a detached description, keeping the resolved layer mask.
    pub fn into_desc(self) -> ShapeDesc {
        ShapeDesc {
            geometry: self.geometry,
            group: self.group,
            layers: Some(self.layers),
            sensor: self.sensor,
            elasticity: self.elasticity,
        }
    }
}

/// Membership is the group's own bit, the filter is the layer mask. Rapier
/// requires both sides to admit each other, which is the symmetric layer rule.
pub fn interaction_groups(group: CollisionGroup, layers: LayerMask) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(group.layer().0),
        Group::from_bits_truncate(layers.0),
    )
}

/// Shape handle stored on a collider by [`Shape::to_collider`].
pub(crate) fn shape_of(collider: &Collider) -> ShapeHandle {
    ShapeHandle(collider.user_data as u64)
}

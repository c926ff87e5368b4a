//! Physics capability consumed by the controllers.
//!
//! Controllers never integrate positions themselves: they hand a velocity and
//! a rotation to a body each tick and read the result back after the backend
//! steps. `KinematicWorld` is the backend the game ships with; it integrates
//! velocity under gravity against a flat ground plane and static box
//! obstacles, and reports every contact with its normal.

use bevy::prelude::*;
use thiserror::Error;

/// Errors raised while creating bodies. These only happen at session start.
#[derive(Debug, Error, PartialEq)]
pub enum PhysicsError {
    #[error("invalid body shape: half extents {0:?} must be positive and finite")]
    InvalidShape(Vec3),
    #[error("invalid body mass {0}")]
    InvalidMass(f32),
    #[error("non-finite spawn transform")]
    NonFiniteTransform,
}

/// Opaque handle to a body owned by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Description of a box body to create.
#[derive(Clone, Copy, Debug)]
pub struct BodyDesc {
    pub position: Vec3,
    pub rotation: Quat,
    /// Half the box size along each local axis.
    pub half_extents: Vec3,
    pub mass: f32,
}

/// A contact reported by the backend for one body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// Contact normal pointing away from the other surface, towards the body.
    pub normal: Vec3,
    /// The other body, or `None` for static world geometry.
    pub other: Option<BodyHandle>,
}

/// Per-entity body handle.
pub trait PhysicsBody {
    fn position(&self) -> Vec3;
    fn rotation(&self) -> Quat;
    fn linear_velocity(&self) -> Vec3;
    fn set_velocity(&mut self, velocity: Vec3);
    fn set_rotation(&mut self, rotation: Quat);
    /// Teleport the body. Used when the avatar is placed next to a vehicle.
    fn set_position(&mut self, position: Vec3);
    /// Contacts from the most recent step, if not drained already.
    fn drain_contacts(&mut self) -> Vec<Contact>;
}

/// The physics engine as seen by the simulation.
pub trait PhysicsBackend {
    type Body: PhysicsBody;

    fn spawn_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError>;
    fn body(&self, handle: BodyHandle) -> Option<&Self::Body>;
    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Self::Body>;
    /// Advance every body by `dt` seconds.
    fn step(&mut self, dt: f32);
    /// Release a body and everything it reports. Returns false if unknown.
    fn remove_body(&mut self, handle: BodyHandle) -> bool;
    fn body_count(&self) -> usize;
}

/// Box body integrated by [`KinematicWorld`].
#[derive(Clone, Debug)]
pub struct KinematicBody {
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    half_extents: Vec3,
    mass: f32,
    contacts: Vec<Contact>,
}

impl KinematicBody {
    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }
}

impl PhysicsBody for KinematicBody {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn linear_velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        if velocity.is_finite() {
            self.velocity = velocity;
        }
    }

    fn set_rotation(&mut self, rotation: Quat) {
        if rotation.is_finite() {
            self.rotation = rotation.normalize();
        }
    }

    fn set_position(&mut self, position: Vec3) {
        if position.is_finite() {
            self.position = position;
        }
    }

    fn drain_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.contacts)
    }
}

/// Static axis-aligned box, such as a building.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// Gravity plus a static ground plane at `ground_height` and static boxes.
///
/// Bodies do not collide with each other.
#[derive(Clone, Debug)]
pub struct KinematicWorld {
    bodies: Vec<Option<KinematicBody>>,
    obstacles: Vec<Obstacle>,
    gravity: f32,
    ground_height: f32,
}

impl Default for KinematicWorld {
    fn default() -> Self {
        Self::new(-30.0)
    }
}

impl KinematicWorld {
    pub fn new(gravity: f32) -> Self {
        Self {
            bodies: Vec::new(),
            obstacles: Vec::new(),
            gravity,
            ground_height: 0.0,
        }
    }

    pub fn gravity(&self) -> f32 {
        self.gravity
    }

    /// Add a static box that bodies land on and slide along.
    pub fn add_obstacle(&mut self, center: Vec3, half_extents: Vec3) -> Result<(), PhysicsError> {
        if !half_extents.is_finite() || half_extents.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidShape(half_extents));
        }
        if !center.is_finite() {
            return Err(PhysicsError::NonFiniteTransform);
        }
        self.obstacles.push(Obstacle {
            center,
            half_extents,
        });
        Ok(())
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Push `body` out of `obstacle` along the axis of least penetration.
    fn resolve_obstacle(body: &mut KinematicBody, obstacle: &Obstacle) {
        let delta = body.position - obstacle.center;
        let overlap = body.half_extents + obstacle.half_extents - delta.abs();
        if overlap.min_element() < 0.0 {
            return;
        }

        let (axis, depth) = if overlap.y <= overlap.x && overlap.y <= overlap.z {
            (Vec3::Y, overlap.y)
        } else if overlap.x <= overlap.z {
            (Vec3::X, overlap.x)
        } else {
            (Vec3::Z, overlap.z)
        };
        let normal = axis * axis.dot(delta).signum();

        body.position += normal * depth;
        let into = body.velocity.dot(normal);
        if into < 0.0 {
            body.velocity -= normal * into;
        }
        body.contacts.push(Contact {
            normal,
            other: None,
        });
    }

    fn integrate(body: &mut KinematicBody, gravity: f32, ground: f32, dt: f32) {
        body.contacts.clear();
        body.velocity.y += gravity * dt;
        body.position += body.velocity * dt;

        // Axis-aligned footprint; rotation about Y does not change the bottom.
        let rest_height = ground + body.half_extents.y;
        if body.position.y <= rest_height {
            body.position.y = rest_height;
            if body.velocity.y < 0.0 {
                body.velocity.y = 0.0;
            }
            body.contacts.push(Contact {
                normal: Vec3::Y,
                other: None,
            });
        }
    }
}

impl PhysicsBackend for KinematicWorld {
    type Body = KinematicBody;

    fn spawn_body(&mut self, desc: BodyDesc) -> Result<BodyHandle, PhysicsError> {
        let half = desc.half_extents;
        if !half.is_finite() || half.min_element() <= 0.0 {
            return Err(PhysicsError::InvalidShape(half));
        }
        if !desc.mass.is_finite() || desc.mass <= 0.0 {
            return Err(PhysicsError::InvalidMass(desc.mass));
        }
        if !desc.position.is_finite() || !desc.rotation.is_finite() {
            return Err(PhysicsError::NonFiniteTransform);
        }

        let body = KinematicBody {
            position: desc.position,
            rotation: desc.rotation.normalize(),
            velocity: Vec3::ZERO,
            half_extents: half,
            mass: desc.mass,
            contacts: Vec::new(),
        };

        let handle = BodyHandle(self.bodies.len() as u32);
        self.bodies.push(Some(body));
        Ok(handle)
    }

    fn body(&self, handle: BodyHandle) -> Option<&KinematicBody> {
        self.bodies.get(handle.0 as usize)?.as_ref()
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut KinematicBody> {
        self.bodies.get_mut(handle.0 as usize)?.as_mut()
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        let (gravity, ground) = (self.gravity, self.ground_height);
        for body in self.bodies.iter_mut().flatten() {
            Self::integrate(body, gravity, ground, dt);
            for obstacle in &self.obstacles {
                Self::resolve_obstacle(body, obstacle);
            }
        }
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies
            .get_mut(handle.0 as usize)
            .and_then(Option::take)
            .is_some()
    }

    fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }
}

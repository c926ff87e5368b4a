//! On-foot avatar control: camera-relative walking, jumping and grounded
//! inference.

use bevy::prelude::*;

use super::physics::Contact;
use super::world_state::{PlayerState, WorldPatch};
use crate::input::HeldKeys;
use crate::world::geometry::flatten;

/// Configuration for the on-foot avatar.
#[derive(Resource, Clone, Debug)]
pub struct LocomotionConfig {
    /// Horizontal walking speed (units/sec).
    pub walk_speed: f32,
    /// Vertical velocity applied by a jump.
    pub jump_impulse: f32,
    /// Ticks before another jump is allowed (about 1/3 s at 60 Hz).
    pub jump_cooldown_ticks: u32,
    /// Contact normals with a larger Y component count as ground.
    pub ground_normal_min_y: f32,
    /// Vertical speed below which the avatar is assumed to be resting.
    pub resting_vertical_speed: f32,
    /// Height below which the avatar is assumed to stand on the ground.
    pub ground_height: f32,
    /// Ticks after a spawn or dismount during which the height rule applies.
    pub spawn_grace_ticks: u32,
    /// Camera height above the avatar origin.
    pub eye_height: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            jump_impulse: 8.0,
            jump_cooldown_ticks: 20,
            ground_normal_min_y: 0.5,
            resting_vertical_speed: 0.1,
            ground_height: 1.0,
            spawn_grace_ticks: 120,
            eye_height: 1.8,
        }
    }
}

/// What the physics engine reported for the avatar this tick.
#[derive(Clone, Debug, Default)]
pub struct BodyReport {
    pub velocity: Vec3,
    pub contacts: Vec<Contact>,
}

/// Output of one locomotion tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocomotionStep {
    /// Full velocity for the avatar body, vertical component included.
    pub velocity: Vec3,
    pub grounded: bool,
    pub jumped: bool,
}

impl LocomotionStep {
    pub fn patch(&self) -> WorldPatch {
        WorldPatch::PlayerMotion {
            grounded: self.grounded,
            vertical_velocity: self.velocity.y,
        }
    }
}

/// Per-avatar controller state that does not belong in the shared store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocomotionController {
    jump_cooldown: u32,
    ticks_since_spawn: u32,
}

impl LocomotionController {
    pub fn jump_cooldown(&self) -> u32 {
        self.jump_cooldown
    }

    /// Restart the spawn grace window. Called when the avatar is placed in
    /// the world, including after leaving a vehicle.
    pub fn respawn(&mut self) {
        self.ticks_since_spawn = 0;
    }

    /// One tick of on-foot movement.
    ///
    /// Order: cooldown, grounded inference, horizontal velocity, jump. The
    /// jump runs last so that a jump always leaves `grounded == false` and
    /// the cooldown at its full value.
    pub fn step(
        &mut self,
        player: &PlayerState,
        keys: &HeldKeys,
        camera_forward: Vec3,
        body: &BodyReport,
        config: &LocomotionConfig,
    ) -> LocomotionStep {
        self.jump_cooldown = self.jump_cooldown.saturating_sub(1);
        self.ticks_since_spawn = self.ticks_since_spawn.saturating_add(1);

        // Re-derived every tick so a walk off a ledge is noticed.
        let grounded = self.infer_grounded(player, body, config);

        let horizontal = walk_velocity(keys, camera_forward, config.walk_speed);
        let mut velocity = Vec3::new(horizontal.x, body.velocity.y, horizontal.z);

        if keys.jump && grounded && self.jump_cooldown == 0 {
            velocity.y = config.jump_impulse;
            self.jump_cooldown = config.jump_cooldown_ticks;
            return LocomotionStep {
                velocity,
                grounded: false,
                jumped: true,
            };
        }

        LocomotionStep {
            velocity,
            grounded,
            jumped: false,
        }
    }

    fn infer_grounded(
        &self,
        player: &PlayerState,
        body: &BodyReport,
        config: &LocomotionConfig,
    ) -> bool {
        let standing_on_surface = body
            .contacts
            .iter()
            .any(|contact| contact.normal.y > config.ground_normal_min_y);
        let resting = body.velocity.y.abs() < config.resting_vertical_speed;
        let settled_after_spawn = self.ticks_since_spawn <= config.spawn_grace_ticks
            && player.position.y < config.ground_height;

        standing_on_surface || resting || settled_after_spawn
    }
}

/// Camera-relative walking velocity.
///
/// The lateral axis is `up × forward`, which points to the viewer's left, so
/// the right key contributes its negation. The sum of held directions is
/// renormalised to `speed`, or zero when nothing (or only opposing keys) is
/// held.
pub fn walk_velocity(keys: &HeldKeys, camera_forward: Vec3, speed: f32) -> Vec3 {
    let forward = flatten(camera_forward).normalize_or_zero();
    let lateral = Vec3::Y.cross(forward).normalize_or_zero();

    let mut direction = Vec3::ZERO;
    if keys.forward {
        direction += forward;
    }
    if keys.backward {
        direction -= forward;
    }
    if keys.left {
        direction += lateral;
    }
    if keys.right {
        direction -= lateral;
    }

    direction.normalize_or_zero() * speed
}

/// First-person camera position for an avatar at `position`.
pub fn eye_position(position: Vec3, config: &LocomotionConfig) -> Vec3 {
    position + Vec3::Y * config.eye_height
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOK_NORTH: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    fn standing() -> PlayerState {
        let mut player = PlayerState::spawned_at(Vec3::new(0.0, 0.9, 0.0));
        player.grounded = true;
        player
    }

    fn airborne(vy: f32) -> (PlayerState, BodyReport) {
        let player = PlayerState::spawned_at(Vec3::new(0.0, 4.0, 0.0));
        let body = BodyReport {
            velocity: Vec3::new(0.0, vy, 0.0),
            contacts: Vec::new(),
        };
        (player, body)
    }

    fn jump_keys() -> HeldKeys {
        HeldKeys {
            jump: true,
            ..default()
        }
    }

    #[test]
    fn jump_sets_impulse_cooldown_and_clears_grounded() {
        let config = LocomotionConfig::default();
        let mut controller = LocomotionController::default();

        let step = controller.step(&standing(), &jump_keys(), LOOK_NORTH, &BodyReport::default(), &config);
        assert!(step.jumped);
        assert!(!step.grounded);
        assert_eq!(step.velocity.y, config.jump_impulse);
        assert_eq!(controller.jump_cooldown(), config.jump_cooldown_ticks);
    }

    #[test]
    fn jump_is_refused_while_cooling_down() {
        let config = LocomotionConfig::default();
        let mut controller = LocomotionController::default();
        controller.step(&standing(), &jump_keys(), LOOK_NORTH, &BodyReport::default(), &config);

        // Still standing (e.g. a low ceiling), but the cooldown blocks it.
        for _ in 1..config.jump_cooldown_ticks {
            let step = controller.step(&standing(), &jump_keys(), LOOK_NORTH, &BodyReport::default(), &config);
            assert!(!step.jumped);
        }
        let step = controller.step(&standing(), &jump_keys(), LOOK_NORTH, &BodyReport::default(), &config);
        assert!(step.jumped);
    }

    #[test]
    fn jump_is_refused_in_the_air() {
        let config = LocomotionConfig::default();
        let mut controller = LocomotionController::default();
        let (player, body) = airborne(-6.0);
        let step = controller.step(&player, &jump_keys(), LOOK_NORTH, &body, &config);
        assert!(!step.jumped);
        assert!(!step.grounded);
        assert_eq!(step.velocity.y, -6.0);
    }

    #[test]
    fn grounded_from_upward_contact_only() {
        let config = LocomotionConfig::default();
        let mut controller = LocomotionController::default();
        let (player, mut body) = airborne(-6.0);

        body.contacts = vec![Contact {
            normal: Vec3::new(1.0, 0.2, 0.0).normalize(),
            other: None,
        }];
        assert!(!controller.step(&player, &HeldKeys::default(), LOOK_NORTH, &body, &config).grounded);

        body.contacts = vec![Contact {
            normal: Vec3::Y,
            other: None,
        }];
        assert!(controller.step(&player, &HeldKeys::default(), LOOK_NORTH, &body, &config).grounded);
    }

    #[test]
    fn grounded_fallbacks() {
        let config = LocomotionConfig::default();

        // Barely moving vertically.
        let mut controller = LocomotionController::default();
        let (player, body) = airborne(0.05);
        assert!(controller.step(&player, &HeldKeys::default(), LOOK_NORTH, &body, &config).grounded);

        // Low after spawn.
        let mut controller = LocomotionController::default();
        let mut low = PlayerState::spawned_at(Vec3::new(0.0, 0.95, 0.0));
        low.grounded = false;
        let falling = BodyReport {
            velocity: Vec3::new(0.0, -3.0, 0.0),
            contacts: Vec::new(),
        };
        assert!(controller.step(&low, &HeldKeys::default(), LOOK_NORTH, &falling, &config).grounded);

        // Same height once the grace window is over.
        for _ in 0..config.spawn_grace_ticks {
            controller.step(&low, &HeldKeys::default(), LOOK_NORTH, &falling, &config);
        }
        assert!(!controller.step(&low, &HeldKeys::default(), LOOK_NORTH, &falling, &config).grounded);

        controller.respawn();
        assert!(controller.step(&low, &HeldKeys::default(), LOOK_NORTH, &falling, &config).grounded);
    }

    #[test]
    fn walking_is_camera_relative() {
        let forward = HeldKeys {
            forward: true,
            ..default()
        };
        let velocity = walk_velocity(&forward, Vec3::new(0.0, -0.5, -1.0), 5.0);
        assert!((velocity - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);

        // Looking down -Z, the right key moves towards +X.
        let right = HeldKeys {
            right: true,
            ..default()
        };
        let velocity = walk_velocity(&right, LOOK_NORTH, 5.0);
        assert!((velocity - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn diagonal_walk_is_not_faster() {
        let keys = HeldKeys {
            forward: true,
            left: true,
            ..default()
        };
        assert!((walk_velocity(&keys, LOOK_NORTH, 5.0).length() - 5.0).abs() < 1e-4);

        let opposed = HeldKeys {
            forward: true,
            backward: true,
            ..default()
        };
        assert_eq!(walk_velocity(&opposed, LOOK_NORTH, 5.0), Vec3::ZERO);
        assert_eq!(walk_velocity(&keys, Vec3::NEG_Y, 5.0), Vec3::ZERO);
    }

    #[test]
    fn walking_keeps_the_vertical_velocity() {
        let config = LocomotionConfig::default();
        let mut controller = LocomotionController::default();
        let (player, body) = airborne(-4.0);
        let keys = HeldKeys {
            forward: true,
            ..default()
        };
        let step = controller.step(&player, &keys, LOOK_NORTH, &body, &config);
        assert_eq!(step.velocity.y, -4.0);
        assert!((Vec3::new(step.velocity.x, 0.0, step.velocity.z).length() - 5.0).abs() < 1e-4);
    }
}

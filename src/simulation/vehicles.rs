//! Player-driven vehicle dynamics and the chase camera.
//!
//! The same `VehicleRecord` is driven either from here (player input) or from
//! `vehicle_traffic` (waypoint AI). Both produce a [`VehicleStep`]: the new
//! speed and yaw for the store plus the velocity handed to the physics body.

use bevy::prelude::*;

use super::world_state::{VehicleId, VehicleRecord, WorldPatch};
use crate::input::HeldKeys;
use crate::world::geometry::{forward_from_yaw, rotate_by_yaw};

/// Tuning shared by every player-driven vehicle.
#[derive(Resource, Clone, Debug)]
pub struct DrivingConfig {
    /// Fraction of acceleration used as engine braking when coasting.
    pub coast_brake: f32,
    /// Per-tick multiplicative decay while no pedal is held.
    pub coast_decay: f32,
    /// Speeds below this snap to zero while coasting.
    pub stop_epsilon: f32,
    /// Minimum |speed| before steering has any effect.
    pub steer_min_speed: f32,
    /// Reverse top speed as a fraction of forward top speed.
    pub reverse_ratio: f32,
    /// Camera offset from the vehicle in its local frame.
    pub chase_offset: Vec3,
    /// Look-at point above the vehicle origin.
    pub look_at_height: f32,
}

impl Default for DrivingConfig {
    fn default() -> Self {
        Self {
            coast_brake: 0.5,
            coast_decay: 0.98,
            stop_epsilon: 0.1,
            steer_min_speed: 0.1,
            reverse_ratio: 0.5,
            chase_offset: Vec3::new(0.0, 2.0, -5.0),
            look_at_height: 1.0,
        }
    }
}

/// Pedal and wheel state for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl From<&HeldKeys> for DriveInput {
    fn from(keys: &HeldKeys) -> Self {
        Self {
            forward: keys.forward,
            backward: keys.backward,
            left: keys.left,
            right: keys.right,
        }
    }
}

/// Result of one dynamics update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleStep {
    pub speed: f32,
    pub yaw: f32,
    /// Horizontal velocity for the physics body. Y is left to the body.
    pub velocity: Vec3,
}

impl VehicleStep {
    pub fn stationary(yaw: f32) -> Self {
        Self {
            speed: 0.0,
            yaw,
            velocity: Vec3::ZERO,
        }
    }

    pub fn patch(&self, id: VehicleId) -> WorldPatch {
        WorldPatch::VehicleMotion {
            id,
            speed: self.speed,
            yaw: self.yaw,
        }
    }
}

/// Clamp `speed` into the legal range for a vehicle with `max_speed`.
#[inline]
pub fn clamp_speed(speed: f32, max_speed: f32, reverse_ratio: f32) -> f32 {
    speed.clamp(-reverse_ratio * max_speed, max_speed)
}

/// Advance a player-driven vehicle by `dt` seconds.
pub fn drive(
    vehicle: &VehicleRecord,
    input: DriveInput,
    dt: f32,
    config: &DrivingConfig,
) -> VehicleStep {
    let profile = vehicle.profile();
    let dt = dt.max(0.0);
    let mut speed = vehicle.speed;

    // Forward wins when both pedals are held.
    if input.forward {
        speed += profile.acceleration * dt;
    } else if input.backward {
        speed -= profile.acceleration * dt;
    } else {
        // Engine braking towards zero, never through it.
        let brake = profile.acceleration * config.coast_brake * dt;
        speed = if speed > 0.0 {
            (speed - brake).max(0.0)
        } else {
            (speed + brake).min(0.0)
        };
    }

    speed = clamp_speed(speed, profile.max_speed, config.reverse_ratio);

    if !input.forward && !input.backward {
        speed *= config.coast_decay;
        if speed.abs() < config.stop_epsilon {
            speed = 0.0;
        }
    }

    let mut yaw = vehicle.yaw;
    if speed.abs() > config.steer_min_speed {
        let direction = if speed < 0.0 { -1.0 } else { 1.0 };
        let wheel = match (input.left, input.right) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        };
        yaw += wheel * profile.handling * dt * direction;
    }

    VehicleStep {
        speed,
        yaw,
        velocity: forward_from_yaw(yaw) * speed,
    }
}

/// Where the chase camera sits and what it looks at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub look_at: Vec3,
}

/// Chase camera behind and above `vehicle`, oriented by its yaw.
pub fn chase_camera(vehicle: &VehicleRecord, config: &DrivingConfig) -> CameraPose {
    CameraPose {
        position: vehicle.position + rotate_by_yaw(config.chase_offset, vehicle.yaw),
        look_at: vehicle.position + Vec3::Y * config.look_at_height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::world_state::VehicleType;

    const DT: f32 = 1.0 / 60.0;

    fn car(kind: VehicleType) -> VehicleRecord {
        VehicleRecord::new(VehicleId(1), kind, Vec3::ZERO, 0.0)
    }

    fn run(vehicle: &mut VehicleRecord, input: DriveInput, ticks: usize) {
        let config = DrivingConfig::default();
        for _ in 0..ticks {
            let step = drive(vehicle, input, DT, &config);
            vehicle.speed = step.speed;
            vehicle.yaw = step.yaw;
        }
    }

    #[test]
    fn speed_stays_in_range_for_every_type_and_input() {
        let config = DrivingConfig::default();
        // Cycle through every combination of the four keys.
        let inputs: Vec<DriveInput> = (0..16u8)
            .map(|bits| DriveInput {
                forward: bits & 1 != 0,
                backward: bits & 2 != 0,
                left: bits & 4 != 0,
                right: bits & 8 != 0,
            })
            .collect();

        for kind in VehicleType::ALL {
            let max = kind.profile().max_speed;
            let mut vehicle = car(kind);
            for round in 0..40 {
                for (i, input) in inputs.iter().enumerate() {
                    // Hold each input long enough to reach the limits.
                    let ticks = 30 + (round * 7 + i * 13) % 400;
                    for _ in 0..ticks {
                        let step = drive(&vehicle, *input, DT, &config);
                        assert!(step.speed <= max && step.speed >= -0.5 * max);
                        vehicle.speed = step.speed;
                        vehicle.yaw = step.yaw;
                    }
                }
            }
        }
    }

    #[test]
    fn sports_car_accelerates_linearly_until_top_speed() {
        let mut vehicle = car(VehicleType::Sports);
        let held = DriveInput {
            forward: true,
            ..default()
        };
        for ticks in [30usize, 60, 120, 180, 240] {
            vehicle.speed = 0.0;
            run(&mut vehicle, held, ticks);
            let t = ticks as f32 * DT;
            let expected = (5.0 * t).min(15.0);
            assert!(
                (vehicle.speed - expected).abs() < 1e-3,
                "t={t} speed={} expected={expected}",
                vehicle.speed
            );
        }
    }

    #[test]
    fn reverse_is_capped_at_half_top_speed() {
        let mut vehicle = car(VehicleType::Suv);
        run(
            &mut vehicle,
            DriveInput {
                backward: true,
                ..default()
            },
            600,
        );
        assert_eq!(vehicle.speed, -6.0);
    }

    #[test]
    fn forward_wins_over_backward() {
        let config = DrivingConfig::default();
        let both = DriveInput {
            forward: true,
            backward: true,
            ..default()
        };
        let mut vehicle = car(VehicleType::Sedan);
        vehicle.speed = 2.0;
        let step = drive(&vehicle, both, DT, &config);
        let accel = VehicleType::Sedan.profile().acceleration;
        assert!((step.speed - (2.0 + accel * DT)).abs() < 1e-5);
    }

    #[test]
    fn coasting_decays_to_a_full_stop() {
        let mut vehicle = car(VehicleType::Sedan);
        vehicle.speed = 8.0;
        run(&mut vehicle, DriveInput::default(), 400);
        assert_eq!(vehicle.speed, 0.0);

        vehicle.speed = -4.0;
        run(&mut vehicle, DriveInput::default(), 400);
        assert_eq!(vehicle.speed, 0.0);
    }

    #[test]
    fn steering_flips_in_reverse_and_needs_motion() {
        let config = DrivingConfig::default();
        let left = DriveInput {
            forward: true,
            left: true,
            ..default()
        };

        let mut vehicle = car(VehicleType::Sedan);
        vehicle.speed = 5.0;
        assert!(drive(&vehicle, left, DT, &config).yaw > 0.0);

        vehicle.speed = -3.0;
        let reversing_left = DriveInput {
            backward: true,
            left: true,
            ..default()
        };
        assert!(drive(&vehicle, reversing_left, DT, &config).yaw < 0.0);

        vehicle.speed = 0.0;
        let parked = DriveInput {
            left: true,
            ..default()
        };
        assert_eq!(drive(&vehicle, parked, DT, &config).yaw, 0.0);
    }

    #[test]
    fn velocity_follows_the_updated_heading() {
        let config = DrivingConfig::default();
        let mut vehicle = car(VehicleType::Sedan);
        vehicle.yaw = std::f32::consts::FRAC_PI_2;
        vehicle.speed = 4.0;
        let step = drive(&vehicle, DriveInput { forward: true, ..default() }, DT, &config);
        assert!((step.velocity.length() - step.speed.abs()).abs() < 1e-4);
        assert!(step.velocity.x > 0.0 && step.velocity.z.abs() < 1e-3);
    }

    #[test]
    fn chase_camera_sits_behind_the_heading() {
        let config = DrivingConfig::default();
        let mut vehicle = car(VehicleType::Sedan);
        vehicle.position = Vec3::new(10.0, 0.75, 10.0);

        let pose = chase_camera(&vehicle, &config);
        assert!((pose.position - Vec3::new(10.0, 2.75, 5.0)).length() < 1e-4);
        assert_eq!(pose.look_at, Vec3::new(10.0, 1.75, 10.0));

        vehicle.yaw = std::f32::consts::FRAC_PI_2;
        let pose = chase_camera(&vehicle, &config);
        assert!((pose.position - Vec3::new(5.0, 2.75, 10.0)).length() < 1e-4);
    }
}

//! Autonomous traffic.
//!
//! AI vehicles follow a shared patrol route, turning a bounded amount per
//! tick towards the active waypoint and pausing briefly on arrival as if
//! stopped at an intersection.

use std::sync::Arc;

use bevy::prelude::*;
use rand::Rng;

use super::vehicles::VehicleStep;
use super::world_state::VehicleRecord;
use crate::world::geometry::{angle_between, flatten, forward_from_yaw};
use crate::world::PatrolRoute;

/// Configuration for AI traffic.
#[derive(Resource, Clone, Debug)]
pub struct AiConfig {
    /// Distance at which a waypoint counts as reached.
    pub arrival_radius: f32,
    /// Ticks spent stopped after reaching a waypoint.
    pub pause_ticks: u32,
    /// Largest yaw change per tick (radians).
    pub max_turn_per_tick: f32,
    /// Constant cruising speed (units/sec).
    pub cruise_speed: f32,
    /// Pick a random starting waypoint per vehicle instead of the first.
    pub random_start: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            arrival_radius: 5.0,
            pause_ticks: 30,
            max_turn_per_tick: 0.03,
            cruise_speed: 5.0,
            random_start: true,
        }
    }
}

/// Navigation state attached to every AI-capable vehicle.
#[derive(Clone, Debug, PartialEq)]
pub struct AiNavigation {
    pub route: Arc<PatrolRoute>,
    pub current_waypoint: usize,
    pub wait_ticks: u32,
}

impl AiNavigation {
    pub fn new(route: Arc<PatrolRoute>, start: usize) -> Self {
        let current_waypoint = if route.is_empty() {
            0
        } else {
            start % route.len()
        };
        Self {
            route,
            current_waypoint,
            wait_ticks: 0,
        }
    }

    /// Start at a random waypoint of `route`.
    pub fn with_random_start<R: Rng + ?Sized>(route: Arc<PatrolRoute>, rng: &mut R) -> Self {
        let start = if route.is_empty() {
            0
        } else {
            rng.gen_range(0..route.len())
        };
        Self::new(route, start)
    }

    pub fn target(&self) -> Option<Vec3> {
        self.route.get(self.current_waypoint)
    }
}

/// Outcome of one AI update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AiStep {
    pub motion: VehicleStep,
    /// Waypoint index that was reached this tick, if any.
    pub arrived: Option<usize>,
}

/// Advance an AI vehicle by one tick.
///
/// `nav` is updated in place; the vehicle itself is only described by the
/// returned step.
pub fn navigate(vehicle: &VehicleRecord, nav: &mut AiNavigation, config: &AiConfig) -> AiStep {
    let idle = AiStep {
        motion: VehicleStep::stationary(vehicle.yaw),
        arrived: None,
    };

    let Some(mut target) = nav.target() else {
        return idle;
    };

    // The arrival tick already counts as the first tick of the pause.
    let mut arrived = None;
    if vehicle.position.distance(target) <= config.arrival_radius {
        let reached = nav.current_waypoint;
        nav.current_waypoint = nav.route.next_index(reached);
        nav.wait_ticks = config.pause_ticks;
        arrived = Some(reached);
        target = nav.target().unwrap_or(target);
    }

    if nav.wait_ticks > 0 {
        nav.wait_ticks -= 1;
        return AiStep { arrived, ..idle };
    }

    let Some(to_target) = flatten(target - vehicle.position).try_normalize() else {
        return AiStep { arrived, ..idle };
    };
    let forward = forward_from_yaw(vehicle.yaw);

    let angle = angle_between(forward, to_target).min(config.max_turn_per_tick);
    let steer = if forward.cross(to_target).y > 0.0 {
        angle
    } else {
        -angle
    };

    let yaw = vehicle.yaw + steer;
    AiStep {
        motion: VehicleStep {
            speed: config.cruise_speed,
            yaw,
            velocity: forward_from_yaw(yaw) * config.cruise_speed,
        },
        arrived,
    }
}

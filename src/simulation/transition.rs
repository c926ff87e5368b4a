//! Getting in and out of vehicles.
//!
//! The on-foot / in-vehicle state lives in the world store; this module only
//! decides which patch an interact press turns into.

use bevy::prelude::*;

use super::world_state::{VehicleId, VehicleRecord, WorldPatch, WorldState};
use crate::world::geometry::{distance, rotate_by_yaw};

#[derive(Resource, Clone, Debug)]
pub struct TransitionConfig {
    /// A vehicle must be strictly closer than this to be entered.
    pub enter_radius: f32,
    /// Where the avatar is placed on exit, in the vehicle's local frame.
    pub dismount_offset: Vec3,
    /// Extra world-space lift so the avatar drops onto the ground.
    pub dismount_lift: f32,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            enter_radius: 3.0,
            dismount_offset: Vec3::new(2.0, 0.0, 0.0),
            dismount_lift: 1.0,
        }
    }
}

/// Closest vehicle to `position` and its distance. Ties keep the lowest id.
pub fn nearest_vehicle(state: &WorldState, position: Vec3) -> Option<(VehicleId, f32)> {
    state
        .vehicles()
        .map(|v| (v.id, distance(position, v.position)))
        .filter(|(_, d)| d.is_finite())
        .fold(None, |best, candidate| match best {
            Some((_, d)) if d <= candidate.1 => best,
            _ => Some(candidate),
        })
}

/// Vehicle the avatar could enter right now, if any.
pub fn enterable_vehicle(state: &WorldState, config: &TransitionConfig) -> Option<VehicleId> {
    if state.in_vehicle() {
        return None;
    }
    nearest_vehicle(state, state.player.position)
        .filter(|&(_, d)| d < config.enter_radius)
        .map(|(id, _)| id)
}

/// Standing spot beside `vehicle` for a dismounting avatar.
pub fn dismount_position(vehicle: &VehicleRecord, config: &TransitionConfig) -> Vec3 {
    vehicle.position
        + rotate_by_yaw(config.dismount_offset, vehicle.yaw)
        + Vec3::Y * config.dismount_lift
}

/// Resolve an interact press against the current state.
///
/// Returns `None` when nothing should change: on foot with no vehicle in
/// range.
pub fn on_interact(state: &WorldState, config: &TransitionConfig) -> Option<WorldPatch> {
    if let Some(vehicle) = state.current_vehicle() {
        return Some(WorldPatch::ExitVehicle {
            id: vehicle.id,
            dismount: dismount_position(vehicle, config),
        });
    }

    match enterable_vehicle(state, config) {
        Some(id) => Some(WorldPatch::EnterVehicle { id }),
        None => {
            debug!("No vehicle within {} units", config.enter_radius);
            None
        }
    }
}

//! The shared world store read by every controller each tick.
//!
//! Controllers only ever see `&WorldState`. Changes come back as
//! [`WorldPatch`] values which the session applies in tick order, so the
//! store has exactly one writer.

use std::collections::BTreeMap;
use std::fmt;

use bevy::prelude::*;

use crate::world::geometry::yaw_from_rotation;

/// Stable identifier of a vehicle for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub u32);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Vehicle body styles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VehicleType {
    #[default]
    Sedan,
    Suv,
    Sports,
}

/// Fixed physical constants of a vehicle type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleProfile {
    pub width: f32,
    pub height: f32,
    pub length: f32,
    pub mass: f32,
    /// Top forward speed (units/sec). Reverse is capped at half of it.
    pub max_speed: f32,
    /// Speed gained per second of throttle.
    pub acceleration: f32,
    /// Yaw rate in radians per second at full lock.
    pub handling: f32,
    /// Body paint as sRGB.
    pub color: (f32, f32, f32),
}

const SEDAN: VehicleProfile = VehicleProfile {
    width: 2.0,
    height: 1.5,
    length: 4.5,
    mass: 1500.0,
    max_speed: 10.0,
    acceleration: 3.0,
    handling: 1.0,
    color: (0.2, 0.2, 0.867),
};

const SUV: VehicleProfile = VehicleProfile {
    width: 2.2,
    height: 1.8,
    length: 5.0,
    mass: 1500.0,
    max_speed: 12.0,
    acceleration: 4.0,
    handling: 0.8,
    color: (0.2, 0.867, 0.2),
};

const SPORTS: VehicleProfile = VehicleProfile {
    width: 2.0,
    height: 1.2,
    length: 4.8,
    mass: 1500.0,
    max_speed: 15.0,
    acceleration: 5.0,
    handling: 1.5,
    color: (0.867, 0.2, 0.2),
};

impl VehicleType {
    pub const ALL: [VehicleType; 3] = [VehicleType::Sedan, VehicleType::Suv, VehicleType::Sports];

    /// The physical constants for this type.
    pub fn profile(self) -> &'static VehicleProfile {
        match self {
            VehicleType::Sedan => &SEDAN,
            VehicleType::Suv => &SUV,
            VehicleType::Sports => &SPORTS,
        }
    }

    /// Parse a roster type name. Unknown names fall back to the sedan.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sedan" => VehicleType::Sedan,
            "suv" => VehicleType::Suv,
            "sports" => VehicleType::Sports,
            other => {
                warn!("Unknown vehicle type '{}', using sedan profile", other);
                VehicleType::Sedan
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VehicleType::Sedan => "sedan",
            VehicleType::Suv => "suv",
            VehicleType::Sports => "sports",
        }
    }
}

/// Who is steering a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMode {
    Player,
    Ai,
}

/// Whether the avatar is walking or seated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerMode {
    #[default]
    OnFoot,
    InVehicle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub rotation: Quat,
    pub grounded: bool,
    pub vertical_velocity: f32,
    pub mode: PlayerMode,
}

impl PlayerState {
    pub fn spawned_at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            grounded: false,
            vertical_velocity: 0.0,
            mode: PlayerMode::OnFoot,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub kind: VehicleType,
    pub position: Vec3,
    /// Heading about +Y. Local forward is +Z.
    pub yaw: f32,
    /// Signed speed along the local forward axis.
    pub speed: f32,
    pub control: ControlMode,
}

impl VehicleRecord {
    pub fn new(id: VehicleId, kind: VehicleType, position: Vec3, yaw: f32) -> Self {
        Self {
            id,
            kind,
            position,
            yaw,
            speed: 0.0,
            control: ControlMode::Ai,
        }
    }

    pub fn profile(&self) -> &'static VehicleProfile {
        self.kind.profile()
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }
}

/// A single change to the store produced by one controller.
#[derive(Clone, Debug, PartialEq)]
pub enum WorldPatch {
    /// Dynamics output for one vehicle.
    VehicleMotion {
        id: VehicleId,
        speed: f32,
        yaw: f32,
    },
    /// Locomotion output for the avatar.
    PlayerMotion {
        grounded: bool,
        vertical_velocity: f32,
    },
    /// The avatar takes the wheel of `id`.
    EnterVehicle { id: VehicleId },
    /// The avatar leaves `id` and stands at `dismount`.
    ExitVehicle { id: VehicleId, dismount: Vec3 },
    /// Pose read back from the physics backend.
    VehiclePose {
        id: VehicleId,
        position: Vec3,
        rotation: Quat,
    },
    PlayerPose { position: Vec3, rotation: Quat },
}

/// Seat height above the vehicle origin while driving.
pub const SEAT_OFFSET: Vec3 = Vec3::new(0.0, 0.5, 0.0);

/// The shared store.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldState {
    in_vehicle: bool,
    current_vehicle: Option<VehicleId>,
    pub player: PlayerState,
    vehicles: BTreeMap<VehicleId, VehicleRecord>,
}

impl WorldState {
    /// Build the store from the avatar and the session roster. Every vehicle
    /// starts under AI control.
    pub fn new(player: PlayerState, roster: impl IntoIterator<Item = VehicleRecord>) -> Self {
        let vehicles = roster
            .into_iter()
            .map(|mut record| {
                record.control = ControlMode::Ai;
                (record.id, record)
            })
            .collect();

        Self {
            in_vehicle: false,
            current_vehicle: None,
            player,
            vehicles,
        }
    }

    pub fn in_vehicle(&self) -> bool {
        self.in_vehicle
    }

    pub fn current_vehicle_id(&self) -> Option<VehicleId> {
        self.current_vehicle
    }

    /// The vehicle currently driven by the player.
    pub fn current_vehicle(&self) -> Option<&VehicleRecord> {
        self.current_vehicle.and_then(|id| self.vehicles.get(&id))
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleRecord> {
        self.vehicles.get(&id)
    }

    /// Vehicles in id order.
    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleRecord> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn player_controlled_count(&self) -> usize {
        self.vehicles
            .values()
            .filter(|v| v.control == ControlMode::Player)
            .count()
    }

    /// `in_vehicle` iff the current vehicle exists and is player controlled,
    /// and no other vehicle is.
    pub fn is_consistent(&self) -> bool {
        let controlled = self.player_controlled_count();
        let current_ok = match self.current_vehicle() {
            Some(v) => v.control == ControlMode::Player,
            None => self.current_vehicle.is_none(),
        };
        let mode_ok = (self.player.mode == PlayerMode::InVehicle) == self.in_vehicle;

        controlled <= 1
            && (controlled == 1) == self.in_vehicle
            && self.in_vehicle == self.current_vehicle.is_some()
            && current_ok
            && mode_ok
    }

    /// Apply one patch. Patches naming an unknown vehicle are ignored.
    pub fn apply(&mut self, patch: WorldPatch) {
        match patch {
            WorldPatch::VehicleMotion { id, speed, yaw } => {
                if let Some(vehicle) = self.vehicles.get_mut(&id) {
                    let max = vehicle.profile().max_speed;
                    vehicle.speed = speed.clamp(-0.5 * max, max);
                    vehicle.yaw = yaw;
                }
            }
            WorldPatch::PlayerMotion {
                grounded,
                vertical_velocity,
            } => {
                self.player.grounded = grounded;
                self.player.vertical_velocity = vertical_velocity;
            }
            WorldPatch::EnterVehicle { id } => {
                if self.in_vehicle {
                    return;
                }
                let Some(vehicle) = self.vehicles.get_mut(&id) else {
                    return;
                };
                vehicle.control = ControlMode::Player;
                vehicle.speed = 0.0;
                self.in_vehicle = true;
                self.current_vehicle = Some(id);
                self.player.mode = PlayerMode::InVehicle;
            }
            WorldPatch::ExitVehicle { id, dismount } => {
                if self.current_vehicle != Some(id) {
                    return;
                }
                if let Some(vehicle) = self.vehicles.get_mut(&id) {
                    vehicle.control = ControlMode::Ai;
                }
                self.in_vehicle = false;
                self.current_vehicle = None;
                self.player.mode = PlayerMode::OnFoot;
                self.player.position = dismount;
                self.player.grounded = false;
                self.player.vertical_velocity = 0.0;
            }
            WorldPatch::VehiclePose {
                id,
                position,
                rotation,
            } => {
                if let Some(vehicle) = self.vehicles.get_mut(&id) {
                    vehicle.position = position;
                    vehicle.yaw = yaw_from_rotation(rotation);
                }
            }
            WorldPatch::PlayerPose { position, rotation } => {
                if self.player.mode == PlayerMode::OnFoot {
                    self.player.position = position;
                    self.player.rotation = rotation;
                }
            }
        }

        if self.in_vehicle {
            self.follow_vehicle();
        }
    }

    /// While seated, the avatar's pose is derived from the vehicle.
    fn follow_vehicle(&mut self) {
        if let Some((position, rotation)) = self
            .current_vehicle()
            .map(|v| (v.position + SEAT_OFFSET, v.rotation()))
        {
            self.player.position = position;
            self.player.rotation = rotation;
        }
    }

    /// Read-only snapshot for HUD and other consumers.
    pub fn view(&self, enter_hint: bool) -> WorldView {
        WorldView {
            in_vehicle: self.in_vehicle,
            current_vehicle: self.current_vehicle().map(|v| CurrentVehicleView {
                id: v.id,
                kind: v.kind,
                speed: v.speed,
            }),
            player: PlayerView {
                position: self.player.position,
                rotation: self.player.rotation,
                mode: self.player.mode,
            },
            vehicles: self
                .vehicles
                .values()
                .map(|v| VehicleView {
                    id: v.id,
                    kind: v.kind,
                    position: v.position,
                    rotation: v.rotation(),
                })
                .collect(),
            enter_hint,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurrentVehicleView {
    pub id: VehicleId,
    pub kind: VehicleType,
    pub speed: f32,
}

impl CurrentVehicleView {
    /// Speedometer reading in km/h as shown to the player.
    pub fn display_speed(&self) -> f32 {
        self.speed.abs() * 10.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView {
    pub position: Vec3,
    pub rotation: Quat,
    pub mode: PlayerMode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VehicleView {
    pub id: VehicleId,
    pub kind: VehicleType,
    pub position: Vec3,
    pub rotation: Quat,
}

/// What the HUD is allowed to see.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldView {
    pub in_vehicle: bool,
    pub current_vehicle: Option<CurrentVehicleView>,
    pub player: PlayerView,
    pub vehicles: Vec<VehicleView>,
    /// A vehicle is close enough to enter.
    pub enter_hint: bool,
}

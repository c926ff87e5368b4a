//! The tick owner.
//!
//! A [`Session`] owns the world store, the physics backend and every
//! controller's private state. Each tick runs in a fixed order:
//!
//! 1. sample input
//! 2. drive the player vehicle and every AI vehicle
//! 3. walk the avatar (on foot only)
//! 4. resolve an interact press
//! 5. step physics and read poses back into the store
//! 6. place the camera
//!
//! Poses are read back in step 5 of the same tick, so the camera and the
//! next tick's controllers never see stale positions.

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use super::locomotion::{eye_position, BodyReport, LocomotionConfig, LocomotionController};
use super::physics::{BodyDesc, BodyHandle, PhysicsBackend, PhysicsBody, PhysicsError};
use super::transition::{enterable_vehicle, on_interact, TransitionConfig};
use super::vehicle_traffic::{navigate, AiConfig, AiNavigation};
use super::vehicles::{chase_camera, drive, DriveInput, DrivingConfig};
use super::world_state::{
    ControlMode, PlayerState, VehicleId, VehicleRecord, VehicleType, WorldPatch, WorldState,
    WorldView,
};
use crate::camera::CameraHandle;
use crate::input::{HeldKeys, KeyboardSource};
use crate::world::geometry::{is_on_road, random_point_on_road, RoadSegment};
use crate::world::PatrolRoute;

/// Every controller's tuning in one place.
#[derive(Resource, Clone, Debug, Default)]
pub struct SimulationConfig {
    pub driving: DrivingConfig,
    pub ai: AiConfig,
    pub locomotion: LocomotionConfig,
    pub transition: TransitionConfig,
}

/// How roster positions are treated at session start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpawnPolicy {
    /// Use the configured positions, warning about any off the road.
    #[default]
    AsConfigured,
    /// Move every vehicle to a random point on the road network.
    SnapToRoad,
}

/// One vehicle of the roster.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleSpawn {
    pub id: VehicleId,
    pub kind: VehicleType,
    pub position: Vec3,
    pub yaw: f32,
}

impl VehicleSpawn {
    /// Roster entry from a type name; unknown names become sedans.
    pub fn named(id: u32, kind: &str, position: Vec3, yaw: f32) -> Self {
        Self {
            id: VehicleId(id),
            kind: VehicleType::from_name(kind),
            position,
            yaw,
        }
    }
}

/// Who and what exists when a session starts.
#[derive(Resource, Clone, Debug)]
pub struct RosterConfig {
    pub vehicles: Vec<VehicleSpawn>,
    pub avatar_spawn: Vec3,
    /// Avatar box size (width, height, depth).
    pub avatar_size: Vec3,
    pub avatar_mass: f32,
    pub spawn_policy: SpawnPolicy,
    /// Distance from a road centreline that still counts as on the road.
    pub road_margin: f32,
    /// Seed for AI start waypoints and spawn snapping.
    pub seed: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
        Self {
            vehicles: vec![
                VehicleSpawn::named(1, "sedan", Vec3::new(10.0, 0.0, 10.0), FRAC_PI_2),
                VehicleSpawn::named(2, "suv", Vec3::new(-10.0, 0.0, -5.0), 0.0),
                VehicleSpawn::named(3, "sports", Vec3::new(5.0, 0.0, -15.0), FRAC_PI_4),
            ],
            avatar_spawn: Vec3::new(0.0, 5.0, 0.0),
            avatar_size: Vec3::new(0.5, 1.8, 0.5),
            avatar_mass: 70.0,
            spawn_policy: SpawnPolicy::AsConfigured,
            road_margin: 4.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create the avatar body")]
    AvatarBody(#[source] PhysicsError),
    #[error("failed to create the body of vehicle {id}")]
    VehicleBody {
        id: VehicleId,
        #[source]
        source: PhysicsError,
    },
    #[error("vehicle {0} appears twice in the roster")]
    DuplicateVehicle(VehicleId),
}

/// Something the host may want to react to, produced by a tick.
#[derive(Event, Clone, Debug, PartialEq)]
pub enum SimEvent {
    EnteredVehicle(VehicleId),
    ExitedVehicle { vehicle: VehicleId, dismount: Vec3 },
    /// The avatar mesh should be shown (`true`) or hidden.
    AvatarVisibility(bool),
    WaypointReached { vehicle: VehicleId, index: usize },
}

struct VehicleSlot {
    body: BodyHandle,
    nav: AiNavigation,
}

pub struct Session<P: PhysicsBackend> {
    physics: P,
    state: WorldState,
    config: SimulationConfig,
    avatar: BodyHandle,
    slots: BTreeMap<VehicleId, VehicleSlot>,
    locomotion: LocomotionController,
    ticks: u64,
    ended: bool,
}

impl<P: PhysicsBackend> Session<P> {
    /// Create every body and controller for a new session.
    ///
    /// On failure, bodies created so far are removed again.
    pub fn start(
        mut physics: P,
        config: SimulationConfig,
        roster: &RosterConfig,
        route: Arc<PatrolRoute>,
        roads: &[RoadSegment],
    ) -> Result<Self, SessionError> {
        let mut rng = StdRng::seed_from_u64(roster.seed);
        let mut created = Vec::new();

        let result = Self::spawn_all(&mut physics, &config, roster, &route, roads, &mut rng, &mut created);
        let (avatar, records, slots) = match result {
            Ok(parts) => parts,
            Err(err) => {
                for handle in created {
                    physics.remove_body(handle);
                }
                return Err(err);
            }
        };

        let player = PlayerState::spawned_at(roster.avatar_spawn);
        let state = WorldState::new(player, records);
        info!(
            "Session started with {} vehicles, avatar at {:?}",
            state.vehicle_count(),
            roster.avatar_spawn
        );

        Ok(Self {
            physics,
            state,
            config,
            avatar,
            slots,
            locomotion: LocomotionController::default(),
            ticks: 0,
            ended: false,
        })
    }

    #[allow(clippy::type_complexity)]
    fn spawn_all(
        physics: &mut P,
        config: &SimulationConfig,
        roster: &RosterConfig,
        route: &Arc<PatrolRoute>,
        roads: &[RoadSegment],
        rng: &mut StdRng,
        created: &mut Vec<BodyHandle>,
    ) -> Result<(BodyHandle, Vec<VehicleRecord>, BTreeMap<VehicleId, VehicleSlot>), SessionError> {
        let avatar = physics
            .spawn_body(BodyDesc {
                position: roster.avatar_spawn,
                rotation: Quat::IDENTITY,
                half_extents: roster.avatar_size / 2.0,
                mass: roster.avatar_mass,
            })
            .map_err(SessionError::AvatarBody)?;
        created.push(avatar);

        let mut records = Vec::with_capacity(roster.vehicles.len());
        let mut slots = BTreeMap::new();

        for spawn in &roster.vehicles {
            if slots.contains_key(&spawn.id) {
                return Err(SessionError::DuplicateVehicle(spawn.id));
            }

            let position = match roster.spawn_policy {
                SpawnPolicy::SnapToRoad => {
                    random_point_on_road(roads, rng).unwrap_or(spawn.position)
                }
                SpawnPolicy::AsConfigured => {
                    if !roads.is_empty() && !is_on_road(spawn.position, roads, roster.road_margin) {
                        warn!(
                            "Vehicle {} spawns off the road at {:?}",
                            spawn.id, spawn.position
                        );
                    }
                    spawn.position
                }
            };

            let profile = spawn.kind.profile();
            let record = VehicleRecord::new(spawn.id, spawn.kind, position, spawn.yaw);
            let body = physics
                .spawn_body(BodyDesc {
                    position,
                    rotation: record.rotation(),
                    half_extents: Vec3::new(profile.width, profile.height, profile.length) / 2.0,
                    mass: profile.mass,
                })
                .map_err(|source| SessionError::VehicleBody {
                    id: spawn.id,
                    source,
                })?;
            created.push(body);

            let nav = if config.ai.random_start {
                AiNavigation::with_random_start(route.clone(), rng)
            } else {
                AiNavigation::new(route.clone(), 0)
            };
            debug!(
                "Vehicle {} ({}) starts towards waypoint {}",
                spawn.id,
                spawn.kind.name(),
                nav.current_waypoint
            );

            records.push(record);
            slots.insert(spawn.id, VehicleSlot { body, nav });
        }

        Ok((avatar, records, slots))
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn avatar_body(&self) -> BodyHandle {
        self.avatar
    }

    pub fn vehicle_body(&self, id: VehicleId) -> Option<BodyHandle> {
        self.slots.get(&id).map(|slot| slot.body)
    }

    pub fn navigation(&self, id: VehicleId) -> Option<&AiNavigation> {
        self.slots.get(&id).map(|slot| &slot.nav)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_running(&self) -> bool {
        !self.ended
    }

    /// HUD snapshot.
    pub fn view(&self) -> WorldView {
        let hint = enterable_vehicle(&self.state, &self.config.transition).is_some();
        self.state.view(hint)
    }

    /// Run one tick of `dt` seconds. Does nothing once the session ended.
    pub fn tick(
        &mut self,
        dt: f32,
        input: &mut KeyboardSource,
        camera: &mut impl CameraHandle,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();
        if self.ended {
            return events;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let frame = input.sample();
        self.update_vehicles(DriveInput::from(&frame.held), dt, &mut events);

        if !self.state.in_vehicle() {
            self.update_avatar(&frame.held, camera.forward());
        }

        if frame.interact {
            self.interact(&mut events);
        }

        self.physics.step(dt);
        self.sync_from_physics();
        self.place_camera(camera);

        self.ticks += 1;
        events
    }

    fn update_vehicles(&mut self, input: DriveInput, dt: f32, events: &mut Vec<SimEvent>) {
        let mut patches = Vec::with_capacity(self.slots.len());

        for vehicle in self.state.vehicles() {
            let Some(slot) = self.slots.get_mut(&vehicle.id) else {
                continue;
            };

            let motion = match vehicle.control {
                ControlMode::Player => drive(vehicle, input, dt, &self.config.driving),
                ControlMode::Ai => {
                    let step = navigate(vehicle, &mut slot.nav, &self.config.ai);
                    if let Some(index) = step.arrived {
                        debug!("Vehicle {} reached waypoint {}", vehicle.id, index);
                        events.push(SimEvent::WaypointReached {
                            vehicle: vehicle.id,
                            index,
                        });
                    }
                    step.motion
                }
            };

            if let Some(body) = self.physics.body_mut(slot.body) {
                let vertical = body.linear_velocity().y;
                body.set_velocity(Vec3::new(motion.velocity.x, vertical, motion.velocity.z));
                body.set_rotation(Quat::from_rotation_y(motion.yaw));
            }
            patches.push(motion.patch(vehicle.id));
        }

        for patch in patches {
            self.state.apply(patch);
        }
    }

    fn update_avatar(&mut self, keys: &HeldKeys, camera_forward: Vec3) {
        let Some(body) = self.physics.body_mut(self.avatar) else {
            return;
        };
        let report = BodyReport {
            velocity: body.linear_velocity(),
            contacts: body.drain_contacts(),
        };

        let step = self.locomotion.step(
            &self.state.player,
            keys,
            camera_forward,
            &report,
            &self.config.locomotion,
        );
        body.set_velocity(step.velocity);
        self.state.apply(step.patch());
    }

    fn interact(&mut self, events: &mut Vec<SimEvent>) {
        let Some(patch) = on_interact(&self.state, &self.config.transition) else {
            return;
        };

        match patch {
            WorldPatch::EnterVehicle { id } => {
                self.state.apply(patch);
                if self.state.current_vehicle_id() != Some(id) {
                    return;
                }
                // Speed was reset; stop the body too so it does not drift
                // for the rest of this tick.
                if let Some(slot) = self.slots.get(&id) {
                    if let Some(body) = self.physics.body_mut(slot.body) {
                        let vertical = body.linear_velocity().y;
                        body.set_velocity(Vec3::new(0.0, vertical, 0.0));
                    }
                }
                info!("Entered vehicle {}", id);
                events.push(SimEvent::EnteredVehicle(id));
                events.push(SimEvent::AvatarVisibility(false));
            }
            WorldPatch::ExitVehicle { id, dismount } => {
                self.state.apply(patch);
                if self.state.in_vehicle() {
                    return;
                }
                if let Some(body) = self.physics.body_mut(self.avatar) {
                    body.set_position(dismount);
                    body.set_velocity(Vec3::ZERO);
                    body.drain_contacts();
                }
                self.locomotion.respawn();
                info!("Exited vehicle {} at {:?}", id, dismount);
                events.push(SimEvent::ExitedVehicle {
                    vehicle: id,
                    dismount,
                });
                events.push(SimEvent::AvatarVisibility(true));
            }
            other => self.state.apply(other),
        }
    }

    fn sync_from_physics(&mut self) {
        for (&id, slot) in &self.slots {
            if let Some(body) = self.physics.body(slot.body) {
                self.state.apply(WorldPatch::VehiclePose {
                    id,
                    position: body.position(),
                    rotation: body.rotation(),
                });
            }
        }

        if self.state.in_vehicle() {
            // The seated avatar rides along with its body parked on the seat.
            if let Some(body) = self.physics.body_mut(self.avatar) {
                body.set_position(self.state.player.position);
                body.set_velocity(Vec3::ZERO);
            }
        } else if let Some(body) = self.physics.body(self.avatar) {
            self.state.apply(WorldPatch::PlayerPose {
                position: body.position(),
                rotation: body.rotation(),
            });
        }
    }

    fn place_camera(&self, camera: &mut impl CameraHandle) {
        match self.state.current_vehicle() {
            Some(vehicle) => {
                let pose = chase_camera(vehicle, &self.config.driving);
                camera.set_position(pose.position);
                camera.look_at(pose.look_at);
            }
            None => {
                camera.set_position(eye_position(self.state.player.position, &self.config.locomotion));
            }
        }
    }

    /// Release every body and the input listener. Later ticks are no-ops.
    pub fn end(&mut self, input: &mut KeyboardSource) {
        if self.ended {
            return;
        }
        self.physics.remove_body(self.avatar);
        for slot in self.slots.values() {
            self.physics.remove_body(slot.body);
        }
        input.detach();
        self.ended = true;
        info!("Session ended after {} ticks", self.ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::TransformCamera;
    use crate::input::Action;
    use crate::simulation::physics::KinematicWorld;
    use crate::simulation::world_state::PlayerMode;
    use crate::world::RoadNetwork;

    const DT: f32 = 1.0 / 60.0;

    fn start_with(roster: RosterConfig) -> Session<KinematicWorld> {
        let roads = RoadNetwork::crossroads().segments();
        Session::start(
            KinematicWorld::default(),
            SimulationConfig::default(),
            &roster,
            PatrolRoute::city_loop().shared(),
            &roads,
        )
        .unwrap()
    }

    fn start() -> Session<KinematicWorld> {
        start_with(RosterConfig::default())
    }

    /// Runs ticks, checking the store after each one.
    fn run(
        session: &mut Session<KinematicWorld>,
        input: &mut KeyboardSource,
        camera: &mut Transform,
        ticks: usize,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(session.tick(DT, input, &mut TransformCamera(&mut *camera)));
            assert!(session.state().is_consistent());
        }
        events
    }

    /// Avatar standing right next to the sedan.
    fn beside_sedan() -> RosterConfig {
        RosterConfig {
            avatar_spawn: Vec3::new(12.0, 0.9, 10.0),
            ..default()
        }
    }

    #[test]
    fn avatar_falls_and_lands() {
        let mut session = start();
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();

        run(&mut session, &mut input, &mut camera, 120);
        let player = &session.state().player;
        assert!((player.position.y - 0.9).abs() < 1e-3);
        assert!(player.grounded);
        assert_eq!(camera.translation, player.position + Vec3::Y * 1.8);
    }

    #[test]
    fn enter_drive_and_exit() {
        let mut session = start_with(beside_sedan());
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();
        run(&mut session, &mut input, &mut camera, 5);

        input.press(Action::Interact);
        let events = run(&mut session, &mut input, &mut camera, 1);
        assert!(events.contains(&SimEvent::EnteredVehicle(VehicleId(1))));
        assert!(events.contains(&SimEvent::AvatarVisibility(false)));
        assert!(session.state().in_vehicle());
        assert_eq!(session.state().player.mode, PlayerMode::InVehicle);

        input.press(Action::Forward);
        run(&mut session, &mut input, &mut camera, 120);
        let sedan = session.state().current_vehicle().unwrap().clone();
        assert!(sedan.speed > 5.0 && sedan.speed <= 10.0);
        // Yaw π/2 means driving towards +X.
        assert!(sedan.position.x > 14.0);

        input.release(Action::Forward);
        input.press(Action::Interact);
        let events = run(&mut session, &mut input, &mut camera, 1);
        let exit = events.iter().find_map(|event| match event {
            SimEvent::ExitedVehicle { vehicle, dismount } => Some((*vehicle, *dismount)),
            _ => None,
        });
        let (vehicle, dismount) = exit.unwrap();
        assert_eq!(vehicle, VehicleId(1));
        assert!(events.contains(&SimEvent::AvatarVisibility(true)));
        assert!(!session.state().in_vehicle());
        assert_eq!(session.state().vehicle(VehicleId(1)).unwrap().control, ControlMode::Ai);

        // The avatar starts from the dismount point and falls to the ground.
        assert!(session.state().player.position.distance(dismount) < 0.1);
        run(&mut session, &mut input, &mut camera, 60);
        assert!((session.state().player.position.y - 0.9).abs() < 1e-3);
    }

    #[test]
    fn interact_out_of_range_does_nothing() {
        let mut session = start();
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();
        input.press(Action::Interact);
        let events = run(&mut session, &mut input, &mut camera, 1);
        assert!(events.is_empty());
        assert!(!session.state().in_vehicle());
    }

    #[test]
    fn store_matches_physics_in_the_same_tick() {
        let mut session = start_with(beside_sedan());
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();

        for _ in 0..200 {
            session.tick(DT, &mut input, &mut TransformCamera(&mut camera));
            for vehicle in session.state().vehicles() {
                let handle = session.vehicle_body(vehicle.id).unwrap();
                let body = session.physics().body(handle).unwrap();
                assert_eq!(vehicle.position, body.position());
            }
            let avatar = session.physics().body(session.avatar_body()).unwrap();
            assert_eq!(session.state().player.position, avatar.position());
        }
    }

    #[test]
    fn chase_camera_follows_without_lag() {
        let mut session = start_with(beside_sedan());
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();
        input.press(Action::Interact);
        input.press(Action::Forward);
        run(&mut session, &mut input, &mut camera, 30);

        let vehicle = session.state().current_vehicle().unwrap();
        let expected = chase_camera(vehicle, &session.config().driving);
        assert!((camera.translation - expected.position).length() < 1e-4);
    }

    #[test]
    fn ai_vehicles_patrol_and_report_waypoints() {
        let mut session = start();
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();
        let start: Vec<Vec3> = session.state().vehicles().map(|v| v.position).collect();

        let events = run(&mut session, &mut input, &mut camera, 3000);
        let moved = session
            .state()
            .vehicles()
            .zip(&start)
            .all(|(v, before)| v.position.distance(*before) > 1.0);
        assert!(moved);
        assert!(events
            .iter()
            .any(|event| matches!(event, SimEvent::WaypointReached { .. })));
        assert!(session.state().vehicles().all(|v| v.speed <= v.profile().max_speed));
    }

    #[test]
    fn same_seed_same_world() {
        let roster = RosterConfig {
            spawn_policy: SpawnPolicy::SnapToRoad,
            seed: 9,
            ..default()
        };
        let a = start_with(roster.clone());
        let b = start_with(roster);
        assert_eq!(a.state(), b.state());
        for vehicle in a.state().vehicles() {
            assert_eq!(vehicle.position.y, 0.0);
            assert_eq!(
                a.navigation(vehicle.id).unwrap().current_waypoint,
                b.navigation(vehicle.id).unwrap().current_waypoint
            );
        }
    }

    #[test]
    fn avatar_lands_on_a_roof_and_jumps_from_it() {
        let mut physics = KinematicWorld::default();
        physics
            .add_obstacle(Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 1.0, 3.0))
            .unwrap();
        let roads = RoadNetwork::crossroads().segments();
        let mut session = Session::start(
            physics,
            SimulationConfig::default(),
            &RosterConfig::default(),
            PatrolRoute::city_loop().shared(),
            &roads,
        )
        .unwrap();
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();

        run(&mut session, &mut input, &mut camera, 150);
        assert!((session.state().player.position.y - 2.9).abs() < 1e-3);
        assert!(session.state().player.grounded);

        input.press(Action::Jump);
        run(&mut session, &mut input, &mut camera, 5);
        input.release(Action::Jump);
        assert!(session.state().player.position.y > 3.2);
    }

    #[test]
    fn default_road_margin_is_four_units() {
        let roads = RoadNetwork::crossroads().segments();
        let margin = RosterConfig::default().road_margin;
        assert!(is_on_road(Vec3::new(20.0, 0.0, 3.9), &roads, margin));
        assert!(!is_on_road(Vec3::new(20.0, 0.0, 5.0), &roads, margin));
    }

    #[test]
    fn end_releases_everything() {
        let mut session = start();
        let mut input = KeyboardSource::default();
        let mut camera = Transform::default();
        run(&mut session, &mut input, &mut camera, 10);
        assert_eq!(session.physics().body_count(), 4);

        session.end(&mut input);
        assert_eq!(session.physics().body_count(), 0);
        assert!(!input.is_attached());
        assert!(!session.is_running());

        let before = session.state().clone();
        input.press(Action::Forward);
        let events = session.tick(DT, &mut input, &mut TransformCamera(&mut camera));
        assert!(events.is_empty());
        assert_eq!(session.state(), &before);
        assert_eq!(session.ticks(), 10);
    }

    #[test]
    fn bad_roster_fails_cleanly() {
        let mut roster = RosterConfig::default();
        roster.vehicles.push(roster.vehicles[0].clone());
        let roads = RoadNetwork::crossroads().segments();
        let result = Session::start(
            KinematicWorld::default(),
            SimulationConfig::default(),
            &roster,
            PatrolRoute::city_loop().shared(),
            &roads,
        );
        assert!(matches!(result, Err(SessionError::DuplicateVehicle(VehicleId(1)))));

        let roster = RosterConfig {
            avatar_mass: 0.0,
            ..default()
        };
        let result = Session::start(
            KinematicWorld::default(),
            SimulationConfig::default(),
            &roster,
            PatrolRoute::city_loop().shared(),
            &roads,
        );
        assert!(matches!(result, Err(SessionError::AvatarBody(PhysicsError::InvalidMass(_)))));
    }
}

//! Driving simulation: vehicles, AI traffic, the on-foot avatar and the
//! transitions between them.
//!
//! The simulation runs on a fixed timestep (default 60 Hz) decoupled from
//! rendering. Each step is one [`Session::tick`]; its events are forwarded
//! as Bevy [`SimEvent`]s.

use bevy::prelude::*;

use crate::camera::{DriverCamera, TransformCamera};
use crate::game_state::GameState;
use crate::input::KeyboardSource;
use crate::world::{PatrolRoute, RoadNetwork, WorldConfig};

pub mod locomotion;
pub mod physics;
pub mod session;
pub mod transition;
pub mod vehicle_traffic;
pub mod vehicles;
pub mod world_state;

pub use session::{
    RosterConfig, Session, SessionError, SimEvent, SimulationConfig, SpawnPolicy, VehicleSpawn,
};

use physics::KinematicWorld;
use world_state::WorldView;

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimulationConfig>()
            .init_resource::<RosterConfig>()
            .init_resource::<SimulationClock>()
            .init_resource::<LatestView>()
            .add_event::<SimEvent>()
            .add_systems(
                OnEnter(GameState::Playing),
                start_session.run_if(not(resource_exists::<ActiveSession>)),
            )
            .add_systems(
                Update,
                simulation_tick_system
                    .in_set(SimulationSet)
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(OnEnter(GameState::Ended), end_session);
    }
}

/// Systems that advance the simulation. Presentation runs after it.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimulationSet;

/// The running session.
#[derive(Resource)]
pub struct ActiveSession(pub Session<KinematicWorld>);

/// HUD snapshot taken after the last tick of each frame.
#[derive(Resource, Default)]
pub struct LatestView(pub Option<WorldView>);

/// Fixed timestep bookkeeping.
#[derive(Resource)]
pub struct SimulationClock {
    /// Ticks per second.
    pub tick_rate: f32,
    /// Upper bound on ticks run in one frame; the rest of a backlog is dropped.
    pub max_ticks_per_frame: u32,
    /// Total ticks since the session started.
    pub total_ticks: u64,
    /// Accumulated time for fixed timestep.
    pub accumulator: f32,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks_per_frame: 5,
            total_ticks: 0,
            accumulator: 0.0,
        }
    }
}

fn start_session(
    mut commands: Commands,
    config: Res<SimulationConfig>,
    roster: Res<RosterConfig>,
    world: Res<WorldConfig>,
    roads: Res<RoadNetwork>,
    mut clock: ResMut<SimulationClock>,
    mut input: ResMut<KeyboardSource>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    input.attach();
    let mut physics = KinematicWorld::new(world.gravity);
    for building in &world.buildings {
        if let Err(err) = physics.add_obstacle(building.center(), building.half_extents()) {
            warn!("Skipping building at {:?}: {}", building.footprint, err);
        }
    }

    let segments = roads.segments();
    let result = Session::start(
        physics,
        config.clone(),
        &roster,
        PatrolRoute::city_loop().shared(),
        &segments,
    );

    match result {
        Ok(session) => {
            clock.total_ticks = 0;
            clock.accumulator = 0.0;
            commands.insert_resource(LatestView(Some(session.view())));
            commands.insert_resource(ActiveSession(session));
        }
        Err(err) => {
            error!("Could not start session: {}", err);
            input.detach();
            next_state.set(GameState::Ended);
        }
    }
}

/// Runs as many fixed ticks as the frame time allows.
fn simulation_tick_system(
    time: Res<Time>,
    mut clock: ResMut<SimulationClock>,
    session: Option<ResMut<ActiveSession>>,
    mut input: ResMut<KeyboardSource>,
    mut cameras: Query<&mut Transform, With<DriverCamera>>,
    mut events: EventWriter<SimEvent>,
    mut view: ResMut<LatestView>,
) {
    let Some(mut session) = session else {
        return;
    };
    let Ok(mut camera) = cameras.get_single_mut() else {
        return;
    };

    clock.accumulator += time.delta_secs();
    let tick_duration = 1.0 / clock.tick_rate;

    let mut ran = 0;
    while clock.accumulator >= tick_duration && ran < clock.max_ticks_per_frame {
        clock.accumulator -= tick_duration;
        clock.total_ticks += 1;
        ran += 1;

        let produced = session
            .0
            .tick(tick_duration, &mut input, &mut TransformCamera(&mut camera));
        events.send_batch(produced);
    }

    if ran == clock.max_ticks_per_frame {
        clock.accumulator = clock.accumulator.min(tick_duration);
    }

    if ran > 0 {
        view.0 = Some(session.0.view());
    }
}

fn end_session(
    mut commands: Commands,
    session: Option<ResMut<ActiveSession>>,
    mut input: ResMut<KeyboardSource>,
    mut view: ResMut<LatestView>,
) {
    if let Some(mut session) = session {
        session.0.end(&mut input);
        commands.remove_resource::<ActiveSession>();
    }
    view.0 = None;
}

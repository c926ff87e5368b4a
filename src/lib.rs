//! NightDrive - a small open-world driving game.
//!
//! Walk around a night-time crossroads, climb into any of the parked cars
//! and drive it while the others patrol the block on their own.

use bevy::prelude::*;

pub mod camera;
pub mod game_state;
pub mod input;
pub mod render;
pub mod simulation;
pub mod world;

/// Every plugin the game needs on top of Bevy's `DefaultPlugins`.
pub struct NightDrivePlugin;

impl Plugin for NightDrivePlugin {
    fn build(&self, app: &mut App) {
        app
            // Game state management
            .add_plugins(game_state::GameStatePlugin)
            // World management
            .add_plugins(world::WorldPlugin)
            // Keyboard
            .add_plugins(input::InputPlugin)
            // Simulation
            .add_plugins(simulation::SimulationPlugin)
            // Presentation
            .add_plugins(camera::CameraPlugin)
            .add_plugins(render::RenderPlugin);
    }
}

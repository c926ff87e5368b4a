//! Session lifecycle.
//!
//! `Loading` builds the scene, `Playing` ticks the simulation, `Paused`
//! freezes it and `Ended` releases the session. P toggles pause, Escape ends
//! the session and R starts a new one once it has ended.

use bevy::prelude::*;

pub struct GameStatePlugin;

impl Plugin for GameStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GameState>()
            .add_systems(Update, finish_loading.run_if(in_state(GameState::Loading)))
            .add_systems(
                Update,
                session_controls.run_if(not(in_state(GameState::Loading))),
            );
    }
}

/// High-level game state controlling which systems run.
#[derive(States, Default, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum GameState {
    /// Building the scene.
    #[default]
    Loading,
    /// Active gameplay - simulation running.
    Playing,
    /// Simulation frozen, nothing ticks.
    Paused,
    /// Session released; bodies and input are gone.
    Ended,
}

/// Everything is generated in code, so loading completes on the first frame.
fn finish_loading(mut next_state: ResMut<NextState<GameState>>) {
    next_state.set(GameState::Playing);
}

/// What a key press does in a given state.
pub fn next_state_for(state: GameState, key: KeyCode) -> Option<GameState> {
    match (state, key) {
        (GameState::Playing, KeyCode::KeyP) => Some(GameState::Paused),
        (GameState::Paused, KeyCode::KeyP) => Some(GameState::Playing),
        (GameState::Playing | GameState::Paused, KeyCode::Escape) => Some(GameState::Ended),
        (GameState::Ended, KeyCode::KeyR) => Some(GameState::Playing),
        _ => None,
    }
}

fn session_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    state: Res<State<GameState>>,
    mut next_state: ResMut<NextState<GameState>>,
) {
    for &key in keyboard.get_just_pressed() {
        if let Some(next) = next_state_for(*state.get(), key) {
            match next {
                GameState::Paused => info!("Simulation PAUSED"),
                GameState::Playing if *state.get() == GameState::Paused => {
                    info!("Simulation RESUMED")
                }
                GameState::Playing => info!("Starting a new session"),
                GameState::Ended => info!("Ending session"),
                GameState::Loading => {}
            }
            next_state.set(next);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_toggles_and_escape_ends() {
        assert_eq!(next_state_for(GameState::Playing, KeyCode::KeyP), Some(GameState::Paused));
        assert_eq!(next_state_for(GameState::Paused, KeyCode::KeyP), Some(GameState::Playing));
        assert_eq!(next_state_for(GameState::Paused, KeyCode::Escape), Some(GameState::Ended));
        assert_eq!(next_state_for(GameState::Ended, KeyCode::Escape), None);
        assert_eq!(next_state_for(GameState::Ended, KeyCode::KeyR), Some(GameState::Playing));
        // Driving keys never change the state.
        assert_eq!(next_state_for(GameState::Playing, KeyCode::KeyW), None);
    }
}

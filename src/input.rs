//! Keyboard input source.
//!
//! The host turns key presses into [`KeyEvent`]s on the [`KeyboardSource`]
//! queue. At the start of each tick the session drains the queue into the
//! held-key state and an interact latch.

use std::collections::VecDeque;

use bevy::prelude::*;

use crate::game_state::GameState;

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<InputBindings>()
            .init_resource::<KeyboardSource>()
            .add_systems(
                PreUpdate,
                forward_key_events.after(bevy::input::InputSystem),
            );
    }
}

/// Game actions bound to keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Forward,
    Backward,
    Left,
    Right,
    Jump,
    Interact,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Down(Action),
    Up(Action),
}

/// Which movement keys are currently held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeldKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

impl HeldKeys {
    fn set(&mut self, action: Action, down: bool) {
        match action {
            Action::Forward => self.forward = down,
            Action::Backward => self.backward = down,
            Action::Left => self.left = down,
            Action::Right => self.right = down,
            Action::Jump => self.jump = down,
            Action::Interact => {}
        }
    }
}

/// Input sampled for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub held: HeldKeys,
    /// Interact was pressed since the previous tick.
    pub interact: bool,
}

/// Event queue fed by the host's key listener.
#[derive(Resource, Debug)]
pub struct KeyboardSource {
    queue: VecDeque<KeyEvent>,
    held: HeldKeys,
    attached: bool,
}

impl Default for KeyboardSource {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            held: HeldKeys::default(),
            attached: true,
        }
    }
}

impl KeyboardSource {
    /// Queue an event. Dropped once the listener is detached.
    pub fn push(&mut self, event: KeyEvent) {
        if self.attached {
            self.queue.push_back(event);
        }
    }

    pub fn press(&mut self, action: Action) {
        self.push(KeyEvent::Down(action));
    }

    pub fn release(&mut self, action: Action) {
        self.push(KeyEvent::Up(action));
    }

    /// Drain queued events into the held state for this tick.
    ///
    /// Interact is edge triggered: one or more presses since the last sample
    /// count as a single interaction.
    pub fn sample(&mut self) -> InputFrame {
        let mut interact = false;
        while let Some(event) = self.queue.pop_front() {
            match event {
                KeyEvent::Down(Action::Interact) => interact = true,
                KeyEvent::Down(action) => self.held.set(action, true),
                KeyEvent::Up(action) => self.held.set(action, false),
            }
        }
        InputFrame {
            held: self.held,
            interact,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Reattach after a previous session released the listener.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Stop listening and forget everything held or queued.
    pub fn detach(&mut self) {
        self.attached = false;
        self.queue.clear();
        self.held = HeldKeys::default();
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Key to action mapping.
#[derive(Resource, Clone, Debug)]
pub struct InputBindings {
    pub bindings: Vec<(KeyCode, Action)>,
}

impl Default for InputBindings {
    fn default() -> Self {
        Self {
            bindings: vec![
                (KeyCode::KeyW, Action::Forward),
                (KeyCode::KeyS, Action::Backward),
                (KeyCode::KeyA, Action::Left),
                (KeyCode::KeyD, Action::Right),
                (KeyCode::Space, Action::Jump),
                (KeyCode::KeyE, Action::Interact),
            ],
        }
    }
}

/// Presses only count while playing. Releases are always forwarded so a key
/// let go during a pause is not still held on resume.
fn forward_key_events(
    keys: Res<ButtonInput<KeyCode>>,
    bindings: Res<InputBindings>,
    state: Res<State<GameState>>,
    mut input: ResMut<KeyboardSource>,
) {
    let playing = *state.get() == GameState::Playing;
    for &(key, action) in &bindings.bindings {
        if playing && keys.just_pressed(key) {
            input.press(action);
        }
        if keys.just_released(key) {
            input.release(action);
        }
    }
}

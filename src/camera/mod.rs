//! Perspective driving camera.
//!
//! The simulation positions the camera through [`CameraHandle`] each tick:
//! a chase view while driving, the avatar's eye while on foot. Orientation on
//! foot belongs to mouse look, which grabs the cursor like a pointer lock.

use bevy::{
    core_pipeline::tonemapping::Tonemapping,
    input::mouse::MouseMotion,
    pbr::{DistanceFog, FogFalloff},
    prelude::*,
    window::{CursorGrabMode, PrimaryWindow},
};

use crate::game_state::GameState;
use crate::simulation::world_state::PlayerMode;
use crate::simulation::LatestView;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CameraConfig>()
            .add_systems(Startup, setup_camera)
            .add_systems(
                Update,
                (grab_cursor, mouse_look)
                    .chain()
                    .run_if(in_state(GameState::Playing)),
            )
            .add_systems(OnExit(GameState::Playing), release_cursor);
    }
}

/// What the simulation needs from a camera.
pub trait CameraHandle {
    /// World-space viewing direction.
    fn forward(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);
    /// Turn to face `target`, keeping world up.
    fn look_at(&mut self, target: Vec3);
}

/// [`CameraHandle`] over a Bevy `Transform`.
pub struct TransformCamera<'a>(pub &'a mut Transform);

impl CameraHandle for TransformCamera<'_> {
    fn forward(&self) -> Vec3 {
        self.0.forward().as_vec3()
    }

    fn set_position(&mut self, position: Vec3) {
        self.0.translation = position;
    }

    fn look_at(&mut self, target: Vec3) {
        // Aiming at its own position would produce a NaN rotation.
        if target.distance_squared(self.0.translation) > f32::EPSILON {
            self.0.look_at(target, Vec3::Y);
        }
    }
}

/// Camera settings.
#[derive(Resource, Clone, Debug)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Radians of turn per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    /// Pitch limit for mouse look (radians).
    pub max_pitch: f32,
    pub fog_color: Color,
    pub fog_density: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            mouse_sensitivity: 0.002,
            max_pitch: 1.5,
            fog_color: Color::srgb(0.05, 0.05, 0.12),
            fog_density: 0.01,
        }
    }
}

/// Marker for the camera driven by the simulation.
#[derive(Component)]
pub struct DriverCamera;

fn setup_camera(mut commands: Commands, config: Res<CameraConfig>) {
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: config.fov_degrees.to_radians(),
            near: config.near,
            far: config.far,
            ..default()
        }),
        Transform::from_xyz(0.0, 6.8, 0.0).looking_at(Vec3::new(0.0, 6.8, -1.0), Vec3::Y),
        DistanceFog {
            color: config.fog_color,
            falloff: FogFalloff::Exponential {
                density: config.fog_density,
            },
            ..default()
        },
        Tonemapping::TonyMcMapface,
        DriverCamera,
    ));
}

fn grab_cursor(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mut windows: Query<&mut Window, With<PrimaryWindow>>,
) {
    if !mouse_buttons.just_pressed(MouseButton::Left) {
        return;
    }
    for mut window in &mut windows {
        window.cursor_options.grab_mode = CursorGrabMode::Locked;
        window.cursor_options.visible = false;
    }
}

fn release_cursor(mut windows: Query<&mut Window, With<PrimaryWindow>>) {
    for mut window in &mut windows {
        window.cursor_options.grab_mode = CursorGrabMode::None;
        window.cursor_options.visible = true;
    }
}

fn mouse_look(
    config: Res<CameraConfig>,
    view: Res<LatestView>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut motion: EventReader<MouseMotion>,
    mut cameras: Query<&mut Transform, With<DriverCamera>>,
) {
    let delta: Vec2 = motion.read().map(|event| event.delta).sum();

    let on_foot = view
        .0
        .as_ref()
        .is_some_and(|view| view.player.mode == PlayerMode::OnFoot);
    let locked = windows
        .iter()
        .any(|window| window.cursor_options.grab_mode != CursorGrabMode::None);
    if !on_foot || !locked || delta == Vec2::ZERO {
        return;
    }

    for mut transform in &mut cameras {
        transform.rotation = look_rotation(transform.rotation, delta, &config);
    }
}

/// Apply a mouse delta to a camera rotation. Yaw is unbounded, pitch is
/// clamped so the view never flips over.
pub fn look_rotation(current: Quat, delta: Vec2, config: &CameraConfig) -> Quat {
    let (yaw, pitch, _) = current.to_euler(EulerRot::YXZ);
    let yaw = yaw - delta.x * config.mouse_sensitivity;
    let pitch = (pitch - delta.y * config.mouse_sensitivity)
        .clamp(-config.max_pitch, config.max_pitch);
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0)
}

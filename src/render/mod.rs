//! Scene rendering: ground, roads, vehicle and avatar meshes.
//!
//! Meshes mirror the latest [`LatestView`] snapshot; nothing here feeds back
//! into the simulation.

use bevy::prelude::*;

use crate::simulation::world_state::{VehicleId, VehicleView};
use crate::simulation::{LatestView, RosterConfig, SimEvent, SimulationSet};
use crate::world::WorldConfig;

pub mod road_mesh;

pub struct RenderPlugin;

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(road_mesh::RoadMeshPlugin)
            .insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.06)))
            .insert_resource(AmbientLight {
                color: Color::srgb(0.6, 0.65, 1.0),
                brightness: 150.0,
            })
            .add_systems(Startup, setup_scene)
            .add_systems(
                Update,
                (sync_actor_meshes, apply_avatar_visibility)
                    .chain()
                    .after(SimulationSet),
            );
    }
}

/// Mesh of one simulated vehicle.
#[derive(Component)]
pub struct VehicleMesh {
    pub id: VehicleId,
}

/// Mesh of the on-foot avatar.
#[derive(Component)]
pub struct AvatarMesh;

fn setup_scene(
    mut commands: Commands,
    world: Res<WorldConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(world.ground_size, world.ground_size))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.08, 0.1, 0.08),
            perceptual_roughness: 1.0,
            ..default()
        })),
        Transform::IDENTITY,
    ));

    let building_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.15, 0.15, 0.2),
        perceptual_roughness: 0.8,
        ..default()
    });
    for building in &world.buildings {
        commands.spawn((
            Mesh3d(meshes.add(Cuboid::from_size(building.size))),
            MeshMaterial3d(building_material.clone()),
            Transform::from_translation(building.center()),
        ));
    }

    // Moonlight
    commands.spawn((
        DirectionalLight {
            color: Color::srgb(0.7, 0.75, 1.0),
            illuminance: 800.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(40.0, 80.0, 20.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}

/// Transform for a vehicle mesh.
pub fn vehicle_transform(view: &VehicleView) -> Transform {
    Transform::from_translation(view.position).with_rotation(view.rotation)
}

pub fn avatar_visibility(visible: bool) -> Visibility {
    if visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

/// Spawn, move and despawn meshes to match the latest snapshot.
#[allow(clippy::too_many_arguments)]
fn sync_actor_meshes(
    mut commands: Commands,
    view: Res<LatestView>,
    roster: Res<RosterConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut vehicles: Query<(Entity, &VehicleMesh, &mut Transform), Without<AvatarMesh>>,
    mut avatars: Query<(Entity, &mut Transform), With<AvatarMesh>>,
) {
    if !view.is_changed() {
        return;
    }

    let Some(view) = view.0.as_ref() else {
        for (entity, _, _) in &vehicles {
            commands.entity(entity).despawn();
        }
        for (entity, _) in &avatars {
            commands.entity(entity).despawn();
        }
        return;
    };

    let mut spawned = Vec::new();
    for vehicle in &view.vehicles {
        let existing = vehicles.iter_mut().find(|(_, mesh, _)| mesh.id == vehicle.id);
        match existing {
            Some((_, _, mut transform)) => *transform = vehicle_transform(vehicle),
            None => spawned.push(vehicle),
        }
    }

    for vehicle in spawned {
        let profile = vehicle.kind.profile();
        let (r, g, b) = profile.color;
        commands.spawn((
            Mesh3d(meshes.add(Cuboid::new(profile.width, profile.height, profile.length))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::srgb(r, g, b),
                metallic: 0.4,
                perceptual_roughness: 0.4,
                ..default()
            })),
            vehicle_transform(vehicle),
            VehicleMesh { id: vehicle.id },
        ));
    }

    let avatar_transform =
        Transform::from_translation(view.player.position).with_rotation(view.player.rotation);
    match avatars.get_single_mut() {
        Ok((_, mut transform)) => *transform = avatar_transform,
        Err(_) => {
            let size = roster.avatar_size;
            commands.spawn((
                Mesh3d(meshes.add(Cuboid::new(size.x, size.y, size.z))),
                MeshMaterial3d(materials.add(StandardMaterial {
                    base_color: Color::srgb(0.9, 0.8, 0.3),
                    ..default()
                })),
                avatar_transform,
                avatar_visibility(!view.in_vehicle),
                AvatarMesh,
            ));
        }
    }
}

fn apply_avatar_visibility(
    mut events: EventReader<SimEvent>,
    mut avatars: Query<&mut Visibility, With<AvatarMesh>>,
) {
    let Some(visible) = events
        .read()
        .filter_map(|event| match event {
            SimEvent::AvatarVisibility(visible) => Some(*visible),
            _ => None,
        })
        .last()
    else {
        return;
    };

    for mut visibility in &mut avatars {
        *visibility = avatar_visibility(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::world_state::VehicleType;

    #[test]
    fn vehicle_mesh_follows_the_view() {
        let view = VehicleView {
            id: VehicleId(2),
            kind: VehicleType::Suv,
            position: Vec3::new(-10.0, 0.9, -5.0),
            rotation: Quat::from_rotation_y(0.5),
        };
        let transform = vehicle_transform(&view);
        assert_eq!(transform.translation, view.position);
        assert_eq!(transform.rotation, view.rotation);
        assert_eq!(transform.scale, Vec3::ONE);
    }

    #[test]
    fn hidden_avatar_is_hidden() {
        assert_eq!(avatar_visibility(false), Visibility::Hidden);
        assert_ne!(avatar_visibility(true), Visibility::Hidden);
    }
}

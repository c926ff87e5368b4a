//! Road mesh generation from the road network.
//!
//! Each road becomes a flat quad strip slightly above the ground; each
//! intersection gets a square patch so the crossing has no seams.

use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};

use crate::world::roads::RoadNodeType;
use crate::world::RoadNetwork;

pub struct RoadMeshPlugin;

impl Plugin for RoadMeshPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RoadMeshConfig>()
            .add_systems(Startup, generate_road_meshes);
    }
}

/// Marker for road mesh entities.
#[derive(Component)]
pub struct RoadMesh;

#[derive(Resource)]
pub struct RoadMeshConfig {
    /// Lift above the ground plane to avoid z-fighting.
    pub road_height: f32,
    pub color: Color,
}

impl Default for RoadMeshConfig {
    fn default() -> Self {
        Self {
            road_height: 0.02,
            color: Color::srgb(0.2, 0.2, 0.22),
        }
    }
}

fn generate_road_meshes(
    mut commands: Commands,
    network: Res<RoadNetwork>,
    config: Res<RoadMeshConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let road_material = materials.add(StandardMaterial {
        base_color: config.color,
        perceptual_roughness: 0.9,
        ..default()
    });

    let segments = network.segments();
    for segment in &segments {
        let points = [ground_point(segment.start), ground_point(segment.end)];
        let mesh = create_road_strip_mesh(&points, segment.width, config.road_height);
        commands.spawn((
            Mesh3d(meshes.add(mesh)),
            MeshMaterial3d(road_material.clone()),
            Transform::IDENTITY,
            RoadMesh,
        ));
    }

    // Widest road through the node decides the patch size.
    let patch_width = segments.iter().map(|s| s.width).fold(0.0, f32::max);
    for (_, node) in network.nodes() {
        if node.node_type != RoadNodeType::Intersection || patch_width <= 0.0 {
            continue;
        }
        let center = ground_point(node.position);
        let half = Vec2::new(patch_width / 2.0, 0.0);
        let mesh = create_road_strip_mesh(
            &[center - half, center + half],
            patch_width,
            config.road_height + 0.005,
        );
        commands.spawn((
            Mesh3d(meshes.add(mesh)),
            MeshMaterial3d(road_material.clone()),
            Transform::IDENTITY,
            RoadMesh,
        ));
    }

    info!("Road meshes generated for {} roads", segments.len());
}

fn ground_point(p: Vec3) -> Vec2 {
    Vec2::new(p.x, p.z)
}

/// Quad strip of `width` along `points` (XZ plane) at `height`.
pub fn create_road_strip_mesh(points: &[Vec2], width: f32, height: f32) -> Mesh {
    let half_width = width / 2.0;
    let mut vertices: Vec<[f32; 3]> = Vec::with_capacity(points.len() * 2);
    let mut normals: Vec<[f32; 3]> = Vec::with_capacity(points.len() * 2);
    let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(points.len() * 2);
    let mut indices: Vec<u32> = Vec::new();

    let mut accumulated_length = 0.0;

    for i in 0..points.len() {
        let current = points[i];

        let tangent = if points.len() < 2 {
            Vec2::ZERO
        } else if i == 0 {
            (points[1] - points[0]).normalize_or_zero()
        } else if i == points.len() - 1 {
            (points[i] - points[i - 1]).normalize_or_zero()
        } else {
            let incoming = (points[i] - points[i - 1]).normalize_or_zero();
            let outgoing = (points[i + 1] - points[i]).normalize_or_zero();
            (incoming + outgoing).normalize_or_zero()
        };

        let perp = Vec2::new(-tangent.y, tangent.x);
        let left = current + perp * half_width;
        let right = current - perp * half_width;

        vertices.push([left.x, height, left.y]);
        vertices.push([right.x, height, right.y]);
        normals.push([0.0, 1.0, 0.0]);
        normals.push([0.0, 1.0, 0.0]);

        if i > 0 {
            accumulated_length += points[i].distance(points[i - 1]);
        }
        let u = accumulated_length / width.max(f32::EPSILON);
        uvs.push([u, 0.0]);
        uvs.push([u, 1.0]);

        // CCW seen from above.
        if i > 0 {
            let base = (i as u32 - 1) * 2;
            indices.extend_from_slice(&[base, base + 2, base + 1, base + 2, base + 3, base + 1]);
        }
    }

    Mesh::new(PrimitiveTopology::TriangleList, default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vertices)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices))
}

//! World layout: road network, patrol routes and spatial queries.

use bevy::prelude::*;

pub mod geometry;
pub mod roads;

pub use geometry::RoadSegment;
pub use roads::{PatrolRoute, RoadNetwork};

pub struct WorldPlugin;

impl Plugin for WorldPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RoadNetwork::crossroads())
            .init_resource::<WorldConfig>();
    }
}

/// A static building box standing on the ground.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Building {
    /// Ground-plane position of the footprint centre.
    pub footprint: Vec2,
    /// Full size (width, height, depth).
    pub size: Vec3,
}

impl Building {
    pub const fn new(x: f32, z: f32, size: Vec3) -> Self {
        Self {
            footprint: Vec2::new(x, z),
            size,
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(self.footprint.x, self.size.y / 2.0, self.footprint.y)
    }

    pub fn half_extents(&self) -> Vec3 {
        self.size / 2.0
    }
}

/// Global world configuration.
#[derive(Resource)]
pub struct WorldConfig {
    /// Side length of the ground plane in meters.
    pub ground_size: f32,
    /// Gravity along Y (negative is down).
    pub gravity: f32,
    pub buildings: Vec<Building>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            ground_size: 1000.0,
            gravity: -30.0,
            buildings: default_buildings(),
        }
    }
}

/// Downtown tower and residential blocks, kept clear of the roads and of the
/// patrol loop.
pub fn default_buildings() -> Vec<Building> {
    let tower = Vec3::new(10.0, 30.0, 10.0);
    let house = Vec3::new(8.0, 10.0, 8.0);
    vec![
        Building::new(20.0, 20.0, tower),
        Building::new(-20.0, 20.0, house),
        Building::new(-40.0, 20.0, house),
        Building::new(-20.0, 40.0, house),
    ]
}

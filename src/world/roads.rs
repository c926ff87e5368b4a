//! Road network and the patrol routes AI traffic follows.
//!
//! Uses petgraph for the underlying graph structure.

use std::sync::Arc;

use bevy::prelude::*;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use smallvec::SmallVec;

use super::geometry::RoadSegment;

/// A node in the road network (intersection or endpoint).
#[derive(Clone, Debug)]
pub struct RoadNode {
    pub position: Vec3,
    pub node_type: RoadNodeType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoadNodeType {
    Intersection,
    Endpoint,
}

/// An edge in the road network (straight road piece).
#[derive(Clone, Debug)]
pub struct RoadEdge {
    /// Paved width in world units.
    pub width: f32,
    /// Length in world units.
    pub length: f32,
}

/// The road network resource.
#[derive(Resource, Default, Clone)]
pub struct RoadNetwork {
    pub graph: UnGraph<RoadNode, RoadEdge>,
}

impl RoadNetwork {
    /// Add a node to the graph.
    pub fn add_node(&mut self, position: Vec3, node_type: RoadNodeType) -> NodeIndex {
        self.graph.add_node(RoadNode {
            position,
            node_type,
        })
    }

    /// Add a straight road between two nodes.
    pub fn add_road(&mut self, a: NodeIndex, b: NodeIndex, width: f32) -> EdgeIndex {
        let length = self.graph[a].position.distance(self.graph[b].position);
        self.graph.add_edge(a, b, RoadEdge { width, length })
    }

    /// The crossroads the city is laid out around: two 100 unit roads of
    /// width 12 meeting at the origin.
    pub fn crossroads() -> Self {
        let mut network = Self::default();
        let center = network.add_node(Vec3::ZERO, RoadNodeType::Intersection);
        for end in [
            Vec3::new(-50.0, 0.0, 0.0),
            Vec3::new(50.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -50.0),
            Vec3::new(0.0, 0.0, 50.0),
        ] {
            let node = network.add_node(end, RoadNodeType::Endpoint);
            network.add_road(center, node, 12.0);
        }
        network
    }

    /// Every edge as a flat segment, in edge order.
    pub fn segments(&self) -> Vec<RoadSegment> {
        self.graph
            .edge_indices()
            .filter_map(|idx| {
                let (a, b) = self.graph.edge_endpoints(idx)?;
                let edge = self.graph.edge_weight(idx)?;
                Some(RoadSegment::new(
                    self.graph[a].position,
                    self.graph[b].position,
                    edge.width,
                ))
            })
            .collect()
    }

    /// Get all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &RoadNode)> {
        self.graph.node_indices().map(|i| (i, &self.graph[i]))
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// A fixed cyclic sequence of waypoints.
///
/// One route is built once and shared between all AI vehicles through an
/// `Arc`; a vehicle only keeps its own index into it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatrolRoute {
    waypoints: SmallVec<[Vec3; 8]>,
}

impl PatrolRoute {
    pub fn new(waypoints: impl IntoIterator<Item = Vec3>) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
        }
    }

    /// The loop around the city block used by default traffic.
    pub fn city_loop() -> Self {
        Self::new([
            Vec3::new(30.0, 0.0, 0.0),
            Vec3::new(30.0, 0.0, 30.0),
            Vec3::new(-30.0, 0.0, 30.0),
            Vec3::new(-30.0, 0.0, -30.0),
            Vec3::new(30.0, 0.0, -30.0),
        ])
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint at `index`, wrapping around the loop. `None` for an empty
    /// route or a waypoint with non-finite coordinates.
    pub fn get(&self, index: usize) -> Option<Vec3> {
        if self.waypoints.is_empty() {
            return None;
        }
        let point = self.waypoints[index % self.waypoints.len()];
        point.is_finite().then_some(point)
    }

    /// Index following `index` on the loop.
    pub fn next_index(&self, index: usize) -> usize {
        if self.waypoints.is_empty() {
            0
        } else {
            (index + 1) % self.waypoints.len()
        }
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }
}

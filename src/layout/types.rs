use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Group,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Group => f.write_str("group"),
        }
    }
}

/// One recorded node displacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    pub node_id: String,
    pub original_position: [f64; 2],
    pub refined_position: [f64; 2],
    pub adjustment_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutMetrics {
    pub total_width: f64,
    pub total_height: f64,
    pub node_density: f64,
    pub alignment_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionReport {
    pub iterations_used: usize,
    pub converged: bool,
    /// Entity pairs whose padded boxes still overlap after snapping.
    pub residual_overlaps: usize,
    pub refinements_applied: Vec<Refinement>,
    pub layout_metrics: LayoutMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneUtilization {
    pub y_position: f64,
    pub utilized: bool,
    pub connection_count: usize,
    pub color: String,
}

/// A link selected for bus routing, with its resolved anchors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    /// Position of the link in the document's link list.
    #[serde(skip)]
    pub link_index: usize,
    pub link_id: i64,
    pub data_type: String,
    pub lane_y: f64,
    pub distance: f64,
    pub from_pos: (f64, f64),
    pub to_pos: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionAnalysis {
    pub total_connections: usize,
    pub routes: Vec<RouteRequest>,
    pub type_distribution: BTreeMap<String, usize>,
    pub bus_utilization: IndexMap<String, LaneUtilization>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerouteSummary {
    pub node_id: String,
    pub position: [f64; 2],
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingReport {
    pub total_connections: usize,
    pub bus_routed_connections: usize,
    pub total_reroutes_added: usize,
    pub bus_utilization: IndexMap<String, LaneUtilization>,
    pub type_distribution: BTreeMap<String, usize>,
    pub reroutes: Vec<RerouteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingReport>,
    pub collision: CollisionReport,
}

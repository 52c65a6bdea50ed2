//! Layout passes over a workflow [`Document`]: bus routing of long links and
//! AABB collision resolution. Both passes edit the document in place and
//! return a report of what they changed.

pub mod collision;
pub mod routing;
pub mod types;

use tracing::info_span;

use crate::config::LayoutConfig;
use crate::ir::Document;

pub use collision::{count_overlaps, resolve_collisions, snap_to_grid};
pub use routing::{analyze_connections, classify_link_type, plan_path, route_links, PathShape};
pub use types::*;

/// Runs the router (when enabled) and then the collision resolver, so the
/// pass-through nodes the router adds are kept clear of everything else.
pub fn compute_layout(doc: &mut Document, config: &LayoutConfig) -> LayoutReport {
    let _span = info_span!("compute_layout", nodes = doc.nodes.len(), links = doc.links.len())
        .entered();
    let routing = config
        .route_links
        .then(|| route_links(doc, &config.routing));
    let collision = resolve_collisions(doc, &config.collision);
    LayoutReport { routing, collision }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document_from_value;
    use serde_json::json;

    #[test]
    fn pipeline_routes_then_resolves() {
        let mut doc = document_from_value(json!({
            "nodes": [
                {"id": 1, "type": "CheckpointLoaderSimple", "pos": [0, 0], "size": [200, 100]},
                {"id": 2, "type": "KSampler", "pos": [900, 500], "size": [200, 100]},
                {"id": 3, "type": "CLIPTextEncode", "pos": [860, 520], "size": [200, 100]}
            ],
            "links": [[1, 1, 0, 2, 0, "MODEL"], [2, 1, 1, 3, 0, "CLIP"]]
        }))
        .unwrap();
        let config = LayoutConfig::default();
        let report = compute_layout(&mut doc, &config);

        let routing = report.routing.expect("routing enabled by default");
        assert_eq!(routing.bus_routed_connections, 2);
        assert_eq!(doc.nodes.len(), 3 + routing.total_reroutes_added);
        assert!(!report.collision.refinements_applied.is_empty());
        if report.collision.converged {
            assert!(report.collision.iterations_used < config.collision.max_iterations);
        } else {
            assert_eq!(
                report.collision.iterations_used,
                config.collision.max_iterations
            );
        }
        let grid = config.collision.grid_size;
        assert!(doc.nodes.iter().all(|n| n.x % grid == 0.0 && n.y % grid == 0.0));
    }

    #[test]
    fn routing_can_be_disabled() {
        let mut doc = document_from_value(json!({
            "nodes": [{"id": 1, "pos": [0, 0]}, {"id": 2, "pos": [900, 500]}],
            "links": [[1, 1, 0, 2, 0, "MODEL"]]
        }))
        .unwrap();
        let config = LayoutConfig {
            route_links: false,
            ..LayoutConfig::default()
        };
        let report = compute_layout(&mut doc, &config);

        assert!(report.routing.is_none());
        assert_eq!(doc.nodes.len(), 2);
    }
}

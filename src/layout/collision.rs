use tracing::{debug, info, warn};

use crate::config::CollisionConfig;
use crate::ir::{Document, Rect};

use super::types::{CollisionReport, EntityKind, LayoutMetrics, Refinement};

/// A node or group taking part in collision resolution, addressed by index into the document.
#[derive(Debug, Clone)]
struct Entity {
    kind: EntityKind,
    id: String,
    index: usize,
}

fn collect_entities(doc: &Document) -> Vec<Entity> {
    let nodes = doc.nodes.iter().enumerate().map(|(index, node)| Entity {
        kind: EntityKind::Node,
        id: node.key.clone(),
        index,
    });
    let groups = (0..doc.groups.len()).map(|index| Entity {
        kind: EntityKind::Group,
        id: format!("group_{index}"),
        index,
    });
    nodes.chain(groups).collect()
}

fn entity_bounds(doc: &Document, entity: &Entity) -> Rect {
    match entity.kind {
        EntityKind::Node => doc.nodes[entity.index].bounds(),
        EntityKind::Group => doc.groups[entity.index].bounds(),
    }
}

fn entity_origin(doc: &Document, entity: &Entity) -> (f64, f64) {
    match entity.kind {
        EntityKind::Node => {
            let node = &doc.nodes[entity.index];
            (node.x, node.y)
        }
        EntityKind::Group => {
            let group = &doc.groups[entity.index];
            (group.x, group.y)
        }
    }
}

fn set_entity_origin(doc: &mut Document, entity: &Entity, x: f64, y: f64) {
    match entity.kind {
        EntityKind::Node => {
            let node = &mut doc.nodes[entity.index];
            node.x = x;
            node.y = y;
        }
        EntityKind::Group => {
            let group = &mut doc.groups[entity.index];
            group.x = x;
            group.y = y;
        }
    }
}

/// Rounds to the nearest grid multiple; halves go to the even multiple.
pub fn snap_to_grid(value: f64, grid_size: f64) -> f64 {
    if grid_size <= 0.0 {
        return value;
    }
    (value / grid_size).round_ties_even() * grid_size
}

/// Two boxes collide when, each grown by half the padding, they overlap.
/// Boxes that only touch after inflation do not collide.
pub fn collides(a: &Rect, b: &Rect, padding: f64) -> bool {
    let half = padding / 2.0;
    a.inflate(half).intersects(&b.inflate(half))
}

/// Offset that pushes `b` away from `a` along the axis of least raw overlap,
/// clearing the overlap plus the full padding. Ties move vertically.
pub fn displacement(a: &Rect, b: &Rect, padding: f64) -> Option<(f64, f64)> {
    let (x_overlap, y_overlap) = a.overlap(b);
    if x_overlap == 0.0 && y_overlap == 0.0 {
        return None;
    }

    if x_overlap < y_overlap {
        let step = x_overlap + padding;
        let dx = if b.min_x < a.min_x { -step } else { step };
        Some((dx, 0.0))
    } else {
        let step = y_overlap + padding;
        let dy = if b.min_y < a.min_y { -step } else { step };
        Some((0.0, dy))
    }
}

/// Number of entity pairs whose padded boxes overlap.
pub fn count_overlaps(doc: &Document, padding: f64) -> usize {
    let entities = collect_entities(doc);
    let bounds: Vec<Rect> = entities.iter().map(|e| entity_bounds(doc, e)).collect();
    let mut count = 0;
    for i in 0..bounds.len() {
        for j in (i + 1)..bounds.len() {
            if collides(&bounds[i], &bounds[j], padding) {
                count += 1;
            }
        }
    }
    count
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Moves overlapping nodes and groups apart until no padded boxes overlap or
/// `max_iterations` passes have found collisions, then snaps every origin to
/// the grid. The document is updated in place.
pub fn resolve_collisions(doc: &mut Document, config: &CollisionConfig) -> CollisionReport {
    let entities = collect_entities(doc);
    let padding = config.min_padding;
    let grid = config.grid_size;
    let mut refinements = Vec::new();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iterations {
        let mut any_collision = false;
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                let (a, b) = (&entities[i], &entities[j]);
                let a_bounds = entity_bounds(doc, a);
                let b_bounds = entity_bounds(doc, b);
                if !collides(&a_bounds, &b_bounds, padding) {
                    continue;
                }
                any_collision = true;
                let Some((dx, dy)) = displacement(&a_bounds, &b_bounds, padding) else {
                    continue;
                };

                let (x, y) = entity_origin(doc, b);
                set_entity_origin(doc, b, x + dx, y + dy);
                debug!(
                    kind = %b.kind,
                    entity = %b.id,
                    other = %a.id,
                    dx,
                    dy,
                    "displaced entity"
                );
                if b.kind == EntityKind::Node {
                    refinements.push(Refinement {
                        node_id: b.id.clone(),
                        original_position: [snap_to_grid(x, grid), snap_to_grid(y, grid)],
                        refined_position: [
                            snap_to_grid(x + dx, grid),
                            snap_to_grid(y + dy, grid),
                        ],
                        adjustment_reason: format!(
                            "Resolved collision with {}:{}",
                            a.kind, a.id
                        ),
                    });
                }
            }
        }
        if !any_collision {
            converged = true;
            break;
        }
        iterations += 1;
    }

    if !converged {
        warn!(
            max_iterations = config.max_iterations,
            "collision resolution did not converge"
        );
    }

    // Alignment is scored before snapping, which would make every node aligned.
    let aligned = doc
        .nodes
        .iter()
        .filter(|node| grid > 0.0 && node.x % grid == 0.0 && node.y % grid == 0.0)
        .count();

    for entity in &entities {
        let (x, y) = entity_origin(doc, entity);
        set_entity_origin(doc, entity, snap_to_grid(x, grid), snap_to_grid(y, grid));
    }

    let layout_metrics = compute_metrics(doc, &entities, aligned);
    let residual_overlaps = count_overlaps(doc, padding);
    if residual_overlaps > 0 {
        warn!(residual_overlaps, "overlaps remain after collision resolution");
    }
    info!(
        iterations,
        refinements = refinements.len(),
        converged,
        "collision resolution finished"
    );

    CollisionReport {
        iterations_used: iterations,
        converged,
        residual_overlaps,
        refinements_applied: refinements,
        layout_metrics,
    }
}

fn compute_metrics(doc: &Document, entities: &[Entity], aligned: usize) -> LayoutMetrics {
    let canvas = entities
        .iter()
        .map(|entity| entity_bounds(doc, entity))
        .reduce(|acc, rect| acc.union(&rect))
        .unwrap_or(Rect::from_origin_size(0.0, 0.0, 0.0, 0.0));
    let total_width = canvas.width().max(0.0);
    let total_height = canvas.height().max(0.0);
    let canvas_area = (total_width * total_height).max(1.0);

    let node_area: f64 = doc.nodes.iter().map(|node| node.width * node.height).sum();
    let alignment_score = if doc.nodes.is_empty() {
        0.0
    } else {
        aligned as f64 / doc.nodes.len() as f64
    };

    LayoutMetrics {
        total_width: round_to(total_width, 2),
        total_height: round_to(total_height, 2),
        node_density: round_to(node_area / canvas_area, 3),
        alignment_score: round_to(alignment_score, 3),
    }
}

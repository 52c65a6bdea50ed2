use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{BusLane, RoutingConfig};
use crate::ir::{
    Document, InputPort, Link, LinkRecord, Node, NodeId, OutputPort, REROUTE_NODE_TYPE,
    WILDCARD_TYPE,
};
use crate::render::number;

use super::collision::snap_to_grid;
use super::types::{
    ConnectionAnalysis, LaneUtilization, RerouteSummary, RouteRequest, RoutingReport,
};

/// Tag reported for links that match no lane. Such links are never bus-routed.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Which way a routed link travels relative to its lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    /// Both anchors sit on the positive side of the lane: drop to the lane, run along it, come back.
    AlongLane,
    /// The anchors are on opposite sides of the lane: cross it on the way.
    AcrossLane,
    /// Anything else, including anchors exactly on the lane: a single elbow.
    Elbow,
}

type LaneRef<'a> = (&'a String, &'a BusLane);

fn lane_matches(upper: &str, tag: &str, lane: &BusLane) -> bool {
    if lane.aliases.is_empty() {
        return !tag.is_empty() && upper.contains(&tag.to_uppercase());
    }
    lane.aliases
        .iter()
        .any(|alias| !alias.is_empty() && upper.contains(&alias.to_uppercase()))
}

fn classify<'a>(data_type: &str, lanes: &[LaneRef<'a>]) -> Option<LaneRef<'a>> {
    let upper = data_type.to_uppercase();
    lanes
        .iter()
        .find(|(tag, lane)| lane_matches(&upper, tag, lane))
        .copied()
}

fn match_order(config: &RoutingConfig) -> Vec<LaneRef<'_>> {
    config.lanes.iter().collect()
}

/// Lane tag for a link's data type: case-insensitive containment, lanes tried in table order.
/// Priority plays no part.
pub fn classify_link_type<'a>(data_type: &str, config: &'a RoutingConfig) -> Option<&'a str> {
    classify(data_type, &match_order(config)).map(|(tag, _)| tag.as_str())
}

/// Long links, tall links, and links climbing from below the origin band to above it
/// go through their lane.
pub fn needs_bus(from: (f64, f64), to: (f64, f64), config: &RoutingConfig) -> bool {
    let distance = (to.0 - from.0).abs() + (to.1 - from.1).abs();
    let vertical = (to.1 - from.1).abs();
    distance > config.long_link_distance
        || vertical > config.vertical_gap
        || (from.1 > 0.0 && to.1 < 0.0)
}

/// Classifies every well-formed link and picks the ones to bus-route.
/// Links with a missing endpoint are skipped.
pub fn analyze_connections(doc: &Document, config: &RoutingConfig) -> ConnectionAnalysis {
    let lanes = match_order(config);
    let index = doc.node_index();
    let mut routes = Vec::new();
    let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();

    for (link_index, record) in doc.links.iter().enumerate() {
        let LinkRecord::Link(link) = record else {
            continue;
        };
        let (Some(&from_idx), Some(&to_idx)) =
            (index.get(&link.from.key()), index.get(&link.to.key()))
        else {
            debug!(link = link.id, "skipping link with a missing endpoint");
            continue;
        };

        let lane = classify(&link.data_type, &lanes);
        let tag = lane.map(|(tag, _)| tag.as_str()).unwrap_or(UNKNOWN_TYPE);
        *type_distribution.entry(tag.to_string()).or_default() += 1;

        let Some((tag, lane)) = lane else {
            continue;
        };
        let from_pos = doc.nodes[from_idx].output_anchor();
        let to_pos = doc.nodes[to_idx].input_anchor();
        if needs_bus(from_pos, to_pos, config) {
            routes.push(RouteRequest {
                link_index,
                link_id: link.id,
                data_type: tag.clone(),
                lane_y: lane.y,
                distance: (to_pos.0 - from_pos.0).abs() + (to_pos.1 - from_pos.1).abs(),
                from_pos,
                to_pos,
            });
        }
    }

    let bus_utilization = config
        .lanes_by_priority()
        .iter()
        .map(|(tag, lane)| {
            (
                (*tag).clone(),
                LaneUtilization {
                    y_position: lane.y,
                    utilized: routes.iter().any(|route| &route.data_type == *tag),
                    connection_count: type_distribution.get(tag.as_str()).copied().unwrap_or(0),
                    color: lane.color.clone(),
                },
            )
        })
        .collect();

    ConnectionAnalysis {
        total_connections: doc.links.len(),
        routes,
        type_distribution,
        bus_utilization,
    }
}

/// Waypoints (not yet snapped) for a link from `from` to `to` through the lane at `lane_y`.
/// Always returns at least one point.
pub fn plan_path(
    from: (f64, f64),
    to: (f64, f64),
    lane_y: f64,
    config: &RoutingConfig,
) -> (PathShape, Vec<(f64, f64)>) {
    let (from_x, from_y) = from;
    let (to_x, to_y) = to;
    let mut points = Vec::with_capacity(3);

    if from_y > lane_y && to_y > lane_y {
        points.push((from_x, lane_y));
        if (to_x - from_x).abs() > config.lane_hop_distance {
            points.push((to_x, lane_y));
        }
        if (to_y - lane_y).abs() > config.target_gap {
            points.push((to_x, to_y));
        }
        return (PathShape::AlongLane, points);
    }

    if (from_y < lane_y && lane_y < to_y) || (from_y > lane_y && lane_y > to_y) {
        points.push((from_x, lane_y));
        if (to_x - from_x).abs() > config.lane_hop_distance {
            points.push((to_x, lane_y));
        }
        points.push((to_x, to_y));
        return (PathShape::AcrossLane, points);
    }

    if (to_x - from_x).abs() > (to_y - from_y).abs() {
        points.push((to_x, from_y));
    } else {
        points.push((from_x, to_y));
    }
    (PathShape::Elbow, points)
}

fn reroute_node(id: String, x: f64, y: f64, data_type: &str, config: &RoutingConfig) -> Node {
    let x = snap_to_grid(x, config.grid_size);
    let y = snap_to_grid(y, config.grid_size);
    let input_raw = json!({"name": "", "type": WILDCARD_TYPE, "link": null});
    let output_raw = json!({"name": "", "type": WILDCARD_TYPE, "links": [], "slot_index": 0});
    let raw = json!({
        "id": id,
        "type": REROUTE_NODE_TYPE,
        "pos": [number(x), number(y)],
        "size": [number(config.reroute_width), number(config.reroute_height)],
        "flags": {},
        "order": 0,
        "mode": 0,
        "inputs": [input_raw.clone()],
        "outputs": [output_raw.clone()],
        "properties": {"showOutputText": false, "horizontal": false},
        "widgets_values": [data_type],
    });

    Node {
        id: NodeId::Str(id.clone()),
        key: id,
        kind: REROUTE_NODE_TYPE.to_string(),
        x,
        y,
        width: config.reroute_width,
        height: config.reroute_height,
        inputs: vec![InputPort {
            data_type: WILDCARD_TYPE.to_string(),
            link: None,
            raw: object(input_raw),
        }],
        outputs: vec![OutputPort {
            data_type: WILDCARD_TYPE.to_string(),
            links: Vec::new(),
            raw: object(output_raw),
        }],
        raw: object(raw),
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

struct IdAllocator {
    taken: HashSet<String>,
    next_reroute: usize,
    /// `None` once the id space is used up.
    next_link: Option<i64>,
    last_link: Option<i64>,
}

impl IdAllocator {
    fn reroute_id(&mut self) -> String {
        loop {
            self.next_reroute += 1;
            let id = format!("reroute_{}", self.next_reroute);
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Reserves `count` consecutive link ids, or `None` when they would run
    /// past `i64::MAX`.
    fn reserve_links(&mut self, count: usize) -> Option<RangeInclusive<i64>> {
        let first = self.next_link?;
        let last = first.checked_add(i64::try_from(count).ok()?.checked_sub(1)?)?;
        self.next_link = last.checked_add(1);
        self.last_link = Some(last);
        Some(first..=last)
    }
}

/// Replaces `old` in an output port's link list, or appends when it was not recorded.
fn relink_output(node: &mut Node, slot: usize, old: i64, new: i64) {
    if let Some(port) = node.outputs.get_mut(slot) {
        match port.links.iter_mut().find(|id| **id == old) {
            Some(id) => *id = new,
            None => port.links.push(new),
        }
    }
}

fn relink_input(node: &mut Node, slot: usize, new: i64) {
    if let Some(port) = node.inputs.get_mut(slot) {
        port.link = Some(new);
    }
}

/// Rewrites long links into chains through pass-through nodes on their data-type lanes.
/// Untouched links keep their order; rewritten chains are appended after them.
pub fn route_links(doc: &mut Document, config: &RoutingConfig) -> RoutingReport {
    let analysis = analyze_connections(doc, config);
    let index = doc.node_index();
    let mut ids = IdAllocator {
        taken: index.keys().cloned().collect(),
        next_reroute: 0,
        next_link: doc.max_link_id().checked_add(1),
        last_link: None,
    };

    let mut rerouted: HashSet<usize> = HashSet::new();
    let mut chains: Vec<Link> = Vec::new();
    let mut created: Vec<Node> = Vec::new();

    for route in &analysis.routes {
        let Some(original) = doc.links[route.link_index].as_link().cloned() else {
            continue;
        };
        let (shape, points) = plan_path(route.from_pos, route.to_pos, route.lane_y, config);
        let Some(link_ids) = ids.reserve_links(points.len() + 1) else {
            warn!(link = original.id, "link ids exhausted, leaving link direct");
            continue;
        };
        let first_new = created.len();
        for (x, y) in points {
            let id = ids.reroute_id();
            created.push(reroute_node(id, x, y, &route.data_type, config));
        }
        let hops = &mut created[first_new..];

        // source -> hop 1 -> ... -> hop n -> target, one link per step
        let mut stops = vec![(original.from.clone(), original.from_slot)];
        stops.extend(hops.iter().map(|hop| (hop.id.clone(), 0)));
        let targets = hops
            .iter()
            .map(|hop| (hop.id.clone(), 0))
            .chain([(original.to.clone(), original.to_slot)]);
        let chain: Vec<Link> = stops
            .into_iter()
            .zip(targets)
            .zip(link_ids)
            .map(|(((from, from_slot), (to, to_slot)), id)| Link {
                id,
                from,
                from_slot,
                to,
                to_slot,
                data_type: original.data_type.clone(),
            })
            .collect();

        for (k, hop) in hops.iter_mut().enumerate() {
            hop.inputs[0].link = Some(chain[k].id);
            hop.outputs[0].links = vec![chain[k + 1].id];
        }
        if let Some(&from_idx) = index.get(&original.from.key()) {
            relink_output(&mut doc.nodes[from_idx], original.from_slot, original.id, chain[0].id);
        }
        if let Some(&to_idx) = index.get(&original.to.key()) {
            relink_input(&mut doc.nodes[to_idx], original.to_slot, chain[chain.len() - 1].id);
        }

        debug!(
            link = original.id,
            data_type = %route.data_type,
            ?shape,
            reroutes = hops.len(),
            "routed link through bus lane"
        );
        rerouted.insert(route.link_index);
        chains.extend(chain);
    }

    let reroutes = created
        .iter()
        .map(|node| RerouteSummary {
            node_id: node.key.clone(),
            position: [node.x, node.y],
            data_type: node.carried_type().unwrap_or(UNKNOWN_TYPE).to_string(),
        })
        .collect();
    let total_reroutes_added = created.len();

    if !chains.is_empty() {
        let links = std::mem::take(&mut doc.links);
        doc.links = links
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !rerouted.contains(idx))
            .map(|(_, record)| record)
            .chain(chains.into_iter().map(LinkRecord::Link))
            .collect();
        doc.nodes.extend(created);
        if let Some(last) = ids.last_link.filter(|_| doc.raw.contains_key("last_link_id")) {
            doc.raw.insert("last_link_id".to_string(), Value::from(last));
        }
    }

    info!(
        total = analysis.total_connections,
        routed = rerouted.len(),
        reroutes = total_reroutes_added,
        "bus routing finished"
    );

    RoutingReport {
        total_connections: analysis.total_connections,
        bus_routed_connections: rerouted.len(),
        total_reroutes_added,
        bus_utilization: analysis.bus_utilization,
        type_distribution: analysis.type_distribution,
        reroutes,
    }
}

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_NODE_WIDTH: f64 = 200.0;
pub const DEFAULT_NODE_HEIGHT: f64 = 100.0;
pub const DEFAULT_GROUP_BOUNDING: [f64; 4] = [0.0, 0.0, 400.0, 300.0];
/// Node type tag of the pass-through nodes the router inserts.
pub const REROUTE_NODE_TYPE: &str = "Reroute";
/// Port type declared on both ports of a pass-through node.
pub const WILDCARD_TYPE: &str = "*";

/// Node identifier as it appears on the wire. Lookups go through [`NodeId::key`],
/// so `5` and `"5"` name the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Str(String),
}

impl NodeId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(num) => num.as_i64().map(NodeId::Int),
            Value::String(text) => Some(NodeId::Str(text.clone())),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn to_value(&self) -> Value {
        match self {
            NodeId::Int(id) => Value::from(*id),
            NodeId::Str(id) => Value::from(id.clone()),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(id) => write!(f, "{id}"),
            NodeId::Str(id) => f.write_str(id),
        }
    }
}

/// Axis-aligned rectangle stored as min/max corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + width,
            max_y: y + height,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn inflate(&self, amount: f64) -> Self {
        Self {
            min_x: self.min_x - amount,
            min_y: self.min_y - amount,
            max_x: self.max_x + amount,
            max_y: self.max_y + amount,
        }
    }

    /// Edge-touching rectangles do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.max_x <= other.min_x
            || other.max_x <= self.min_x
            || self.max_y <= other.min_y
            || other.max_y <= self.min_y)
    }

    /// Overlap extents on each axis, clamped at zero.
    pub fn overlap(&self, other: &Rect) -> (f64, f64) {
        let x = (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0);
        let y = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        (x, y)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputPort {
    pub data_type: String,
    pub links: Vec<i64>,
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct InputPort {
    pub data_type: String,
    pub link: Option<i64>,
    pub raw: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Lookup key: the id's string form, or the list index / map key for id-less records.
    pub key: String,
    pub kind: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub inputs: Vec<InputPort>,
    pub outputs: Vec<OutputPort>,
    /// The record as read, so fields the layout engine does not own survive a round trip.
    pub raw: Map<String, Value>,
}

impl Node {
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.x, self.y, self.width, self.height)
    }

    /// Right edge, vertical middle.
    pub fn output_anchor(&self) -> (f64, f64) {
        (self.x + self.width, self.y + (self.height / 2.0).floor())
    }

    /// Left edge, vertical middle.
    pub fn input_anchor(&self) -> (f64, f64) {
        (self.x, self.y + (self.height / 2.0).floor())
    }

    pub fn is_reroute(&self) -> bool {
        self.kind == REROUTE_NODE_TYPE
    }

    /// Data type a pass-through node was created for, read from its display field.
    pub fn carried_type(&self) -> Option<&str> {
        if !self.is_reroute() {
            return None;
        }
        self.raw
            .get("widgets_values")
            .and_then(|values| values.get(0))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub raw: Map<String, Value>,
}

impl Group {
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: i64,
    pub from: NodeId,
    pub from_slot: usize,
    pub to: NodeId,
    pub to_slot: usize,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkRecord {
    Link(Link),
    /// Kept verbatim; the router passes it through and the validator reports it.
    Malformed(Value),
}

impl LinkRecord {
    pub fn as_link(&self) -> Option<&Link> {
        match self {
            LinkRecord::Link(link) => Some(link),
            LinkRecord::Malformed(_) => None,
        }
    }

    /// The record's link id, read from the first element of a malformed array too.
    pub fn id(&self) -> Option<i64> {
        match self {
            LinkRecord::Link(link) => Some(link.id),
            LinkRecord::Malformed(Value::Array(items)) => items.first().and_then(Value::as_i64),
            LinkRecord::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodesShape {
    #[default]
    List,
    /// Nodes keyed by id; the map key is kept in [`Node::key`].
    Map,
}

/// A node or group entry that is not a JSON object. It takes no part in
/// layout and is written back verbatim at its original position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueRecord {
    /// Position in the source list or map.
    pub index: usize,
    /// Map key, for id-keyed node maps.
    pub key: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub nodes: Vec<Node>,
    pub nodes_shape: NodesShape,
    pub opaque_nodes: Vec<OpaqueRecord>,
    pub links: Vec<LinkRecord>,
    pub groups: Vec<Group>,
    pub opaque_groups: Vec<OpaqueRecord>,
    pub raw: Map<String, Value>,
}

impl Document {
    /// Node lookup by key. Duplicate keys resolve to the last node.
    pub fn node_index(&self) -> HashMap<String, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.key.clone(), idx))
            .collect()
    }

    pub fn valid_links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter().filter_map(LinkRecord::as_link)
    }

    /// Highest link id in the document, counting malformed records that still
    /// lead with an integer id and a top-level `last_link_id`.
    pub fn max_link_id(&self) -> i64 {
        let from_links = self
            .links
            .iter()
            .filter_map(LinkRecord::id)
            .max()
            .unwrap_or(0);
        let recorded = self
            .raw
            .get("last_link_id")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        from_links.max(recorded)
    }
}

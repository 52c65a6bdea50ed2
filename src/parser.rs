use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{DocumentError, json_kind};
use crate::ir::{
    DEFAULT_GROUP_BOUNDING, DEFAULT_NODE_HEIGHT, DEFAULT_NODE_WIDTH, Document, Group, InputPort,
    Link, LinkRecord, Node, NodeId, NodesShape, OpaqueRecord, OutputPort, WILDCARD_TYPE,
};

pub fn parse_document(input: &str) -> Result<Document, DocumentError> {
    let value: Value = serde_json::from_str(input)?;
    document_from_value(value)
}

/// Normalizes a workflow JSON value into a [`Document`]. Missing or malformed
/// positions, sizes and bounding boxes are replaced with defaults; only a
/// non-object top level is an error.
pub fn document_from_value(value: Value) -> Result<Document, DocumentError> {
    let Value::Object(raw) = value else {
        return Err(DocumentError::NotAnObject {
            found: json_kind(&value),
        });
    };

    let mut nodes = Vec::new();
    let mut opaque_nodes = Vec::new();
    let mut nodes_shape = NodesShape::List;
    let node_records: Vec<(usize, Option<&String>, &Value)> = match raw.get("nodes") {
        Some(Value::Array(records)) => records
            .iter()
            .enumerate()
            .map(|(idx, record)| (idx, None, record))
            .collect(),
        Some(Value::Object(records)) => {
            nodes_shape = NodesShape::Map;
            records
                .iter()
                .enumerate()
                .map(|(idx, (key, record))| (idx, Some(key), record))
                .collect()
        }
        _ => Vec::new(),
    };
    for (idx, key, record) in node_records {
        match parse_node(record, key, idx) {
            Some(node) => nodes.push(node),
            None => opaque_nodes.push(OpaqueRecord {
                index: idx,
                key: key.cloned(),
                value: record.clone(),
            }),
        }
    }

    let links = match raw.get("links") {
        Some(Value::Array(records)) => records.iter().map(parse_link).collect(),
        _ => Vec::new(),
    };

    let mut groups = Vec::new();
    let mut opaque_groups = Vec::new();
    if let Some(Value::Array(records)) = raw.get("groups") {
        for (idx, record) in records.iter().enumerate() {
            match parse_group(record, idx) {
                Some(group) => groups.push(group),
                None => opaque_groups.push(OpaqueRecord {
                    index: idx,
                    key: None,
                    value: record.clone(),
                }),
            }
        }
    }

    Ok(Document {
        nodes,
        nodes_shape,
        opaque_nodes,
        links,
        groups,
        opaque_groups,
        raw,
    })
}

fn parse_node(record: &Value, map_key: Option<&String>, idx: usize) -> Option<Node> {
    let Value::Object(raw) = record else {
        warn!(index = idx, "node record is not an object, passing it through");
        return None;
    };

    let parsed_id = raw.get("id").and_then(NodeId::from_value);
    let (id, key) = match (parsed_id, map_key) {
        (Some(id), Some(key)) => (id, key.clone()),
        (None, Some(key)) => (NodeId::Str(key.clone()), key.clone()),
        (Some(id), None) => {
            let key = id.key();
            (id, key)
        }
        (None, None) => (NodeId::Int(idx as i64), idx.to_string()),
    };

    let (x, y) = raw.get("pos").and_then(parse_pair).unwrap_or((0.0, 0.0));
    let (width, height) = raw
        .get("size")
        .and_then(parse_pair)
        .unwrap_or((DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT));

    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let inputs = match raw.get("inputs") {
        Some(Value::Array(ports)) => ports.iter().map(parse_input_port).collect(),
        _ => Vec::new(),
    };
    let outputs = match raw.get("outputs") {
        Some(Value::Array(ports)) => ports.iter().map(parse_output_port).collect(),
        _ => Vec::new(),
    };

    Some(Node {
        id,
        key,
        kind,
        x,
        y,
        width,
        height,
        inputs,
        outputs,
        raw: raw.clone(),
    })
}

/// Accepts `[a, b, ...]` or `{"0": a, "1": b}`.
fn parse_pair(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Array(items) if items.len() >= 2 => {
            Some((items[0].as_f64()?, items[1].as_f64()?))
        }
        Value::Object(fields) => Some((fields.get("0")?.as_f64()?, fields.get("1")?.as_f64()?)),
        _ => None,
    }
}

fn port_type(raw: &Map<String, Value>) -> String {
    match raw.get("type") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => WILDCARD_TYPE.to_string(),
        Some(other) => other.to_string(),
    }
}

fn parse_output_port(value: &Value) -> OutputPort {
    let raw = value.as_object().cloned().unwrap_or_default();
    let links = raw
        .get("links")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();
    OutputPort {
        data_type: port_type(&raw),
        links,
        raw,
    }
}

fn parse_input_port(value: &Value) -> InputPort {
    let raw = value.as_object().cloned().unwrap_or_default();
    let link = raw.get("link").and_then(Value::as_i64);
    InputPort {
        data_type: port_type(&raw),
        link,
        raw,
    }
}

fn parse_group(record: &Value, idx: usize) -> Option<Group> {
    let Value::Object(raw) = record else {
        warn!(index = idx, "group record is not an object, passing it through");
        return None;
    };

    let bounding = raw
        .get("bounding")
        .and_then(Value::as_array)
        .filter(|items| items.len() >= 4)
        .and_then(|items| {
            Some([
                items[0].as_f64()?,
                items[1].as_f64()?,
                items[2].as_f64()?,
                items[3].as_f64()?,
            ])
        })
        .unwrap_or(DEFAULT_GROUP_BOUNDING);

    Some(Group {
        x: bounding[0],
        y: bounding[1],
        width: bounding[2],
        height: bounding[3],
        raw: raw.clone(),
    })
}

/// `[id, from_node, from_slot, to_node, to_slot, type]`; anything else is kept as malformed.
pub fn parse_link(value: &Value) -> LinkRecord {
    let parsed = value
        .as_array()
        .filter(|items| items.len() == 6)
        .and_then(|items| {
            let data_type = match &items[5] {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            Some(Link {
                id: items[0].as_i64()?,
                from: NodeId::from_value(&items[1])?,
                from_slot: usize::try_from(items[2].as_u64()?).ok()?,
                to: NodeId::from_value(&items[3])?,
                to_slot: usize::try_from(items[4].as_u64()?).ok()?,
                data_type,
            })
        });
    match parsed {
        Some(link) => LinkRecord::Link(link),
        None => LinkRecord::Malformed(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_missing_geometry() {
        let doc = document_from_value(json!({
            "nodes": [
                {"id": 1, "type": "KSampler"},
                {"id": 2, "type": "VAEDecode", "pos": [10, 20], "size": {"0": 300, "1": 120}},
                {"id": 3, "pos": "broken", "size": [5]}
            ],
            "groups": [{"title": "Loaders", "bounding": [1, 2]}]
        }))
        .unwrap();

        assert_eq!((doc.nodes[0].x, doc.nodes[0].y), (0.0, 0.0));
        assert_eq!((doc.nodes[0].width, doc.nodes[0].height), (200.0, 100.0));
        assert_eq!((doc.nodes[1].width, doc.nodes[1].height), (300.0, 120.0));
        assert_eq!((doc.nodes[2].x, doc.nodes[2].width), (0.0, 200.0));
        let group = &doc.groups[0];
        assert_eq!(
            [group.x, group.y, group.width, group.height],
            DEFAULT_GROUP_BOUNDING
        );
    }

    #[test]
    fn keeps_malformed_links_verbatim() {
        let doc = document_from_value(json!({
            "nodes": [],
            "links": [
                [1, 4, 0, 5, 0, "MODEL"],
                [2, 4, 0, 5],
                [3, "a", -1, "b", 0, "IMAGE"]
            ]
        }))
        .unwrap();

        assert!(matches!(doc.links[0], LinkRecord::Link(_)));
        assert_eq!(doc.links[1], LinkRecord::Malformed(json!([2, 4, 0, 5])));
        assert!(matches!(doc.links[2], LinkRecord::Malformed(_)));
    }

    #[test]
    fn node_map_uses_keys_for_lookup() {
        let doc = document_from_value(json!({
            "nodes": {
                "7": {"type": "LoadImage", "pos": [0, 0]},
                "8": {"id": 8, "type": "SaveImage"}
            }
        }))
        .unwrap();

        assert_eq!(doc.nodes_shape, NodesShape::Map);
        assert_eq!(doc.nodes[0].id, NodeId::Str("7".to_string()));
        assert!(doc.node_index().contains_key("8"));
        assert_eq!(doc.node_index().len(), 2);
    }

    #[test]
    fn rejects_non_object_documents() {
        let err = parse_document("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject { found: "an array" }));
    }
}

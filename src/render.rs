use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::ir::{
    Document, Group, InputPort, Link, LinkRecord, Node, NodesShape, OpaqueRecord, OutputPort,
};

/// Integral values are written as JSON integers, the way editors save them.
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

pub fn render_document(doc: &Document) -> Value {
    let mut out = doc.raw.clone();

    if doc.raw.get("nodes").is_some_and(|v| v.is_array() || v.is_object()) || !doc.nodes.is_empty()
    {
        let nodes = match doc.nodes_shape {
            NodesShape::List => Value::Array(splice_opaque(
                doc.nodes.iter().map(render_node).collect(),
                &doc.opaque_nodes,
                |record| record.value.clone(),
            )),
            NodesShape::Map => Value::Object(
                splice_opaque(
                    doc.nodes
                        .iter()
                        .map(|node| (node.key.clone(), render_node(node)))
                        .collect(),
                    &doc.opaque_nodes,
                    |record| {
                        let key = record.key.clone().unwrap_or_else(|| record.index.to_string());
                        (key, record.value.clone())
                    },
                )
                .into_iter()
                .collect(),
            ),
        };
        out.insert("nodes".to_string(), nodes);
    }

    if doc.raw.get("links").is_some_and(Value::is_array) || !doc.links.is_empty() {
        let links = doc.links.iter().map(render_link_record).collect();
        out.insert("links".to_string(), Value::Array(links));
    }

    if doc.raw.get("groups").is_some_and(Value::is_array) || !doc.groups.is_empty() {
        let groups = splice_opaque(
            doc.groups.iter().map(render_group).collect(),
            &doc.opaque_groups,
            |record| record.value.clone(),
        );
        out.insert("groups".to_string(), Value::Array(groups));
    }

    Value::Object(out)
}

/// Puts pass-through records back at their source positions. `records` is in
/// ascending index order, so earlier inserts never shift later targets.
fn splice_opaque<T>(
    mut items: Vec<T>,
    records: &[OpaqueRecord],
    make: impl Fn(&OpaqueRecord) -> T,
) -> Vec<T> {
    for record in records {
        let at = record.index.min(items.len());
        items.insert(at, make(record));
    }
    items
}

pub fn render_node(node: &Node) -> Value {
    let mut out = node.raw.clone();
    out.insert(
        "pos".to_string(),
        Value::Array(vec![number(node.x), number(node.y)]),
    );
    if node.raw.contains_key("inputs") || !node.inputs.is_empty() {
        let inputs = node.inputs.iter().map(render_input_port).collect();
        out.insert("inputs".to_string(), Value::Array(inputs));
    }
    if node.raw.contains_key("outputs") || !node.outputs.is_empty() {
        let outputs = node.outputs.iter().map(render_output_port).collect();
        out.insert("outputs".to_string(), Value::Array(outputs));
    }
    Value::Object(out)
}

fn render_input_port(port: &InputPort) -> Value {
    let mut out = port.raw.clone();
    out.insert(
        "link".to_string(),
        port.link.map(Value::from).unwrap_or(Value::Null),
    );
    Value::Object(out)
}

fn render_output_port(port: &OutputPort) -> Value {
    let mut out = port.raw.clone();
    // An unconnected output saved as `"links": null` stays that way.
    if !port.links.is_empty() || port.raw.get("links").is_some_and(Value::is_array) {
        let links = port.links.iter().copied().map(Value::from).collect();
        out.insert("links".to_string(), Value::Array(links));
    }
    Value::Object(out)
}

fn render_group(group: &Group) -> Value {
    let mut out: Map<String, Value> = group.raw.clone();
    out.insert(
        "bounding".to_string(),
        Value::Array(vec![
            number(group.x),
            number(group.y),
            number(group.width),
            number(group.height),
        ]),
    );
    Value::Object(out)
}

pub fn render_link(link: &Link) -> Value {
    Value::Array(vec![
        Value::from(link.id),
        link.from.to_value(),
        Value::from(link.from_slot),
        link.to.to_value(),
        Value::from(link.to_slot),
        Value::from(link.data_type.clone()),
    ])
}

fn render_link_record(record: &LinkRecord) -> Value {
    match record {
        LinkRecord::Link(link) => render_link(link),
        LinkRecord::Malformed(raw) => raw.clone(),
    }
}

pub fn render_document_string(doc: &Document) -> Result<String> {
    let mut text = serde_json::to_string_pretty(&render_document(doc))?;
    text.push('\n');
    Ok(text)
}

pub fn write_output_json(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
        }
        None => {
            print!("{}", json);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document_from_value;
    use serde_json::json;

    #[test]
    fn preserves_unowned_fields() {
        let input = json!({
            "last_node_id": 2,
            "nodes": [{
                "id": 1,
                "type": "CheckpointLoaderSimple",
                "pos": [10.5, 20],
                "size": {"0": 315, "1": 98},
                "flags": {},
                "outputs": [{"name": "MODEL", "type": "MODEL", "links": null, "slot_index": 0}],
                "widgets_values": ["sdxl.safetensors"]
            }],
            "links": [[3, 1, 0, 2, 0, "MODEL"], [4, 1]],
            "version": 0.4
        });
        let doc = document_from_value(input.clone()).unwrap();
        let out = render_document(&doc);

        assert_eq!(out, input);
    }

    #[test]
    fn non_object_records_keep_their_place() {
        let input = json!({
            "nodes": [null, {"id": 1, "pos": [0, 0]}, "stray", {"id": 2, "pos": [300, 0]}],
            "groups": [7, {"title": "Inputs", "bounding": [0, 0, 400, 300]}]
        });
        let doc = document_from_value(input.clone()).unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.opaque_nodes.len(), 2);

        assert_eq!(render_document(&doc), input);
    }

    #[test]
    fn non_object_map_entries_keep_their_key() {
        let input = json!({
            "nodes": {"3": {"id": 3, "pos": [0, 0]}, "4": false, "5": {"id": 5, "pos": [500, 0]}}
        });
        let doc = document_from_value(input.clone()).unwrap();
        let out = render_document(&doc);

        let keys: Vec<&String> = out["nodes"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["3", "4", "5"]);
        assert_eq!(out, input);
    }

    #[test]
    fn writes_integral_numbers_as_integers() {
        assert_eq!(number(150.0), json!(150));
        assert_eq!(number(-130.0), json!(-130));
        assert_eq!(number(10.5), json!(10.5));
    }

    #[test]
    fn normalizes_defaulted_geometry() {
        let doc = document_from_value(json!({
            "nodes": [{"id": 1, "type": "Note"}],
            "groups": [{"title": "Empty"}]
        }))
        .unwrap();
        let out = render_document(&doc);

        assert_eq!(out["nodes"][0]["pos"], json!([0, 0]));
        assert_eq!(out["groups"][0]["bounding"], json!([0, 0, 400, 300]));
        assert!(out["nodes"][0].get("size").is_none());
    }
}

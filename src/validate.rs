use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::ir::{Document, LinkRecord, WILDCARD_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub total_nodes: usize,
    pub total_links: usize,
    pub total_groups: usize,
    pub valid_links: usize,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub is_valid: bool,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, location: String, message: String) {
        let issue = Issue {
            severity,
            location,
            message,
        };
        match severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }
}

/// Wildcards agree with everything; other tags compare case-insensitively.
fn types_agree(link_type: &str, port_type: &str) -> bool {
    link_type == WILDCARD_TYPE
        || port_type == WILDCARD_TYPE
        || link_type.eq_ignore_ascii_case(port_type)
}

/// Structural checks the layout passes rely on. Reports only; the document is not changed.
pub fn validate_document(doc: &Document) -> ValidationReport {
    let mut report = ValidationReport {
        total_nodes: doc.nodes.len(),
        total_links: doc.links.len(),
        total_groups: doc.groups.len(),
        valid_links: 0,
        errors: Vec::new(),
        warnings: Vec::new(),
        is_valid: true,
    };

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for node in &doc.nodes {
        *seen.entry(node.key.as_str()).or_default() += 1;
    }
    let mut duplicates: Vec<(&str, usize)> =
        seen.into_iter().filter(|(_, count)| *count > 1).collect();
    duplicates.sort();
    for (key, count) in duplicates {
        report.push(
            Severity::Error,
            format!("node_{key}"),
            format!("Node id {key} appears {count} times - cannot auto-fix"),
        );
    }

    for record in &doc.opaque_nodes {
        report.push(
            Severity::Warning,
            format!("node_record_{}", record.index),
            format!("Node record {} is not an object - left as is", record.index),
        );
    }
    for record in &doc.opaque_groups {
        report.push(
            Severity::Warning,
            format!("group_{}", record.index),
            format!("Group record {} is not an object - left as is", record.index),
        );
    }

    let index = doc.node_index();
    let mut has_input: HashSet<String> = HashSet::new();
    let mut has_output: HashSet<String> = HashSet::new();

    for (idx, record) in doc.links.iter().enumerate() {
        match record {
            LinkRecord::Malformed(raw) => {
                let message = match raw {
                    Value::Array(items) if items.len() != 6 => format!(
                        "Link {idx} has {} elements instead of 6 - cannot auto-fix",
                        items.len()
                    ),
                    Value::Array(_) => {
                        format!("Link {idx} has invalid id, node or slot fields - cannot auto-fix")
                    }
                    _ => format!("Link {idx} is not an array - cannot auto-fix"),
                };
                report.push(Severity::Error, format!("link_{idx}"), message);
            }
            LinkRecord::Link(link) => {
                report.valid_links += 1;
                let from = link.from.key();
                let to = link.to.key();
                for endpoint in [&from, &to] {
                    if !index.contains_key(endpoint.as_str()) {
                        report.push(
                            Severity::Warning,
                            format!("link_{idx}"),
                            format!("Link {} references missing node {endpoint}", link.id),
                        );
                    }
                }
                let declared = [
                    index.get(&from).and_then(|&i| {
                        let port = doc.nodes[i].outputs.get(link.from_slot)?;
                        Some(("output", link.from_slot, &from, &port.data_type))
                    }),
                    index.get(&to).and_then(|&i| {
                        let port = doc.nodes[i].inputs.get(link.to_slot)?;
                        Some(("input", link.to_slot, &to, &port.data_type))
                    }),
                ];
                for (side, slot, node, port_type) in declared.into_iter().flatten() {
                    if !types_agree(&link.data_type, port_type) {
                        report.push(
                            Severity::Warning,
                            format!("link_{idx}"),
                            format!(
                                "Link {} carries {} but {side} {slot} of node {node} is {port_type}",
                                link.id, link.data_type
                            ),
                        );
                    }
                }
                has_output.insert(from);
                has_input.insert(to);
            }
        }
    }

    for node in doc.nodes.iter().filter(|node| node.is_reroute()) {
        if !has_input.contains(&node.key) {
            report.push(
                Severity::Warning,
                format!("reroute_{}", node.key),
                format!("Reroute node {} has no input connections", node.key),
            );
        }
        if !has_output.contains(&node.key) {
            report.push(
                Severity::Warning,
                format!("reroute_{}", node.key),
                format!("Reroute node {} has no output connections", node.key),
            );
        }
    }

    report.is_valid = report.errors.is_empty();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::document_from_value;
    use serde_json::json;

    #[test]
    fn reports_structural_errors() {
        let doc = document_from_value(json!({
            "nodes": [
                {"id": 1, "type": "LoadImage"},
                {"id": "1", "type": "SaveImage"},
                {"id": 4, "type": "Reroute"}
            ],
            "links": [
                [1, 1, 0, 4, 0, "IMAGE"],
                [2, 1, 0],
                [3, 4, 0, 9, 0, "IMAGE"]
            ]
        }))
        .unwrap();
        let report = validate_document(&doc);

        assert!(!report.is_valid);
        assert_eq!(report.valid_links, 2);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].location, "node_1");
        assert_eq!(
            report.errors[1].message,
            "Link 1 has 3 elements instead of 6 - cannot auto-fix"
        );
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("missing node 9"));
    }

    #[test]
    fn flags_links_that_disagree_with_port_types() {
        let doc = document_from_value(json!({
            "nodes": [
                {"id": 1, "outputs": [{"name": "CLIP", "type": "CLIP", "links": [1, 2]}]},
                {"id": 2, "inputs": [{"name": "clip", "type": "clip", "link": 1}]},
                {"id": 3, "inputs": [{"name": "model", "type": "MODEL", "link": 2}]},
                {"id": 4, "inputs": [{"name": "", "type": "*", "link": 3}]}
            ],
            "links": [
                [1, 1, 0, 2, 0, "CLIP"],
                [2, 1, 0, 3, 0, "CLIP"],
                [3, 1, 0, 4, 0, "CLIP"]
            ]
        }))
        .unwrap();
        let report = validate_document(&doc);

        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].location, "link_1");
        assert_eq!(
            report.warnings[0].message,
            "Link 2 carries CLIP but input 0 of node 3 is MODEL"
        );
    }

    #[test]
    fn reports_non_object_records() {
        let doc = document_from_value(json!({
            "nodes": [{"id": 1}, null],
            "groups": ["loose"]
        }))
        .unwrap();
        let report = validate_document(&doc);

        assert!(report.is_valid);
        let locations: Vec<&str> = report.warnings.iter().map(|w| w.location.as_str()).collect();
        assert_eq!(locations, ["node_record_1", "group_0"]);
    }

    #[test]
    fn flags_disconnected_reroutes() {
        let doc = document_from_value(json!({
            "nodes": [{"id": "reroute_1", "type": "Reroute"}],
            "links": []
        }))
        .unwrap();
        let report = validate_document(&doc);

        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 2);
    }
}

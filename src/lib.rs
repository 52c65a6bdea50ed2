pub mod config;
pub mod error;
pub mod ir;
pub mod layout;
pub mod parser;
pub mod render;
pub mod validate;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{
    BusLane, CollisionConfig, Config, LayoutConfig, RoutingConfig, config_from_str, load_config,
};
pub use error::DocumentError;
pub use ir::{Document, Link, LinkRecord, Node, NodeId};
pub use layout::{LayoutReport, compute_layout, resolve_collisions, route_links};
pub use parser::parse_document;
pub use render::{render_document, render_document_string};
pub use validate::validate_document;

/// Parses a workflow, runs the full layout pipeline and returns the updated
/// workflow JSON together with the report.
pub fn layout_workflow(
    input: &str,
    config: &LayoutConfig,
) -> Result<(String, LayoutReport), DocumentError> {
    let mut doc = parse_document(input)?;
    let report = compute_layout(&mut doc, config);
    let output = serde_json::to_string(&render_document(&doc))?;
    Ok((output, report))
}

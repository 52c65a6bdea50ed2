use serde::Deserialize;
use serde_json::{Value, json};
use wasm_bindgen::prelude::*;
use workflow_layout::{LayoutConfig, compute_layout, parse_document, render_document};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowLayoutOptions {
    padding: Option<f64>,
    grid_size: Option<f64>,
    max_iterations: Option<usize>,
    route_links: Option<bool>,
}

fn build_layout_config(options: WorkflowLayoutOptions) -> LayoutConfig {
    let mut config = LayoutConfig::default();
    if let Some(padding) = options.padding {
        config.collision.min_padding = padding;
    }
    if let Some(grid_size) = options.grid_size {
        config.collision.grid_size = grid_size;
        config.routing.grid_size = grid_size;
    }
    if let Some(max_iterations) = options.max_iterations {
        config.collision.max_iterations = max_iterations;
    }
    if let Some(route_links) = options.route_links {
        config.route_links = route_links;
    }
    config
}

fn layout_to_json(document: &str, config: &LayoutConfig) -> Result<String, String> {
    let mut doc = parse_document(document).map_err(|error| error.to_string())?;
    let report = compute_layout(&mut doc, config);
    let report = serde_json::to_value(&report).map_err(|error| error.to_string())?;
    let out: Value = json!({
        "document": render_document(&doc),
        "report": report,
    });
    Ok(out.to_string())
}

#[wasm_bindgen]
pub fn layout_workflow_json(
    document: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<WorkflowLayoutOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        WorkflowLayoutOptions::default()
    };

    let config = build_layout_config(options);
    layout_to_json(document, &config).map_err(|error| JsValue::from_str(&error))
}

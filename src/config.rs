use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// (tag, lane y, color, priority, match aliases), in matching order.
const DEFAULT_LANE_TABLE: [(&str, f64, &str, u32, &[&str]); 7] = [
    ("MODEL", -130.0, "#FF6B6B", 1, &[]),
    ("CLIP", -150.0, "#4ECDC4", 2, &[]),
    ("VAE", -170.0, "#45B7D1", 3, &[]),
    ("IMAGE", -190.0, "#96CEB4", 4, &[]),
    ("LATENT", -250.0, "#98D8C8", 7, &[]),
    ("CONDITIONING", -230.0, "#DDA0DD", 6, &[]),
    ("CONTEXT_PIPE", -210.0, "#FFEAA7", 5, &["CONTEXT"]),
];

static DEFAULT_LANES: Lazy<IndexMap<String, BusLane>> = Lazy::new(|| {
    DEFAULT_LANE_TABLE
        .iter()
        .map(|(tag, y, color, priority, aliases)| {
            (
                tag.to_string(),
                BusLane {
                    y: *y,
                    color: color.to_string(),
                    priority: *priority,
                    aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
                },
            )
        })
        .collect()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionConfig {
    pub min_padding: f64,
    pub grid_size: f64,
    pub max_iterations: usize,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            min_padding: 80.0,
            grid_size: 50.0,
            max_iterations: 100,
        }
    }
}

/// A horizontal routing corridor for one data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusLane {
    pub y: f64,
    pub color: String,
    /// Reporting order only; matching follows the order of `RoutingConfig::lanes`.
    pub priority: u32,
    /// Substrings that select this lane; empty means the lane's own tag.
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub grid_size: f64,
    /// Manhattan distance above which a link goes through its lane.
    pub long_link_distance: f64,
    /// Vertical anchor gap above which a link goes through its lane.
    pub vertical_gap: f64,
    /// Horizontal travel above which a second pass-through is placed on the lane.
    pub lane_hop_distance: f64,
    /// Remaining vertical gap above which a pass-through is placed at the target.
    pub target_gap: f64,
    pub reroute_width: f64,
    pub reroute_height: f64,
    /// Lanes in matching order: a link type goes to the first lane it matches.
    pub lanes: IndexMap<String, BusLane>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            grid_size: 50.0,
            long_link_distance: 400.0,
            vertical_gap: 200.0,
            lane_hop_distance: 100.0,
            target_gap: 50.0,
            reroute_width: 75.0,
            reroute_height: 26.0,
            lanes: DEFAULT_LANES.clone(),
        }
    }
}

impl RoutingConfig {
    /// Lanes ordered by priority, then tag.
    pub fn lanes_by_priority(&self) -> Vec<(&String, &BusLane)> {
        let mut lanes: Vec<_> = self.lanes.iter().collect();
        lanes.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        lanes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Run the bus router before collision resolution.
    pub route_links: bool,
    pub collision: CollisionConfig,
    pub routing: RoutingConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            route_links: true,
            collision: CollisionConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub pretty: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CollisionConfigFile {
    min_padding: Option<f64>,
    grid_size: Option<f64>,
    max_iterations: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LaneFile {
    y: Option<f64>,
    color: Option<String>,
    priority: Option<u32>,
    aliases: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RoutingConfigFile {
    grid_size: Option<f64>,
    long_link_distance: Option<f64>,
    vertical_gap: Option<f64>,
    lane_hop_distance: Option<f64>,
    target_gap: Option<f64>,
    reroute_width: Option<f64>,
    reroute_height: Option<f64>,
    replace_lanes: Option<bool>,
    lanes: Option<IndexMap<String, LaneFile>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    route_links: Option<bool>,
    grid_size: Option<f64>,
    collision: Option<CollisionConfigFile>,
    routing: Option<RoutingConfigFile>,
    pretty: Option<bool>,
}

pub fn load_config(path: Option<&Path>) -> Result<Config, DocumentError> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json5 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    let parsed: ConfigFile = if is_json5 {
        json5::from_str(&contents).map_err(|err| DocumentError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
    } else {
        serde_json::from_str(&contents).map_err(|err| DocumentError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?
    };

    apply_config_file(&mut config, parsed);
    Ok(config)
}

/// Parses config text (JSON) and merges it over the defaults.
pub fn config_from_str(contents: &str) -> Result<Config, DocumentError> {
    let parsed: ConfigFile = serde_json::from_str(contents)?;
    let mut config = Config::default();
    apply_config_file(&mut config, parsed);
    Ok(config)
}

fn apply_config_file(config: &mut Config, parsed: ConfigFile) {
    if let Some(v) = parsed.route_links {
        config.layout.route_links = v;
    }
    // A shared grid applies to both stages unless a stage overrides it below.
    if let Some(v) = parsed.grid_size {
        config.layout.collision.grid_size = v;
        config.layout.routing.grid_size = v;
    }
    if let Some(v) = parsed.pretty {
        config.render.pretty = v;
    }

    if let Some(collision) = parsed.collision {
        if let Some(v) = collision.min_padding {
            config.layout.collision.min_padding = v;
        }
        if let Some(v) = collision.grid_size {
            config.layout.collision.grid_size = v;
        }
        if let Some(v) = collision.max_iterations {
            config.layout.collision.max_iterations = v;
        }
    }

    if let Some(routing) = parsed.routing {
        let target = &mut config.layout.routing;
        if let Some(v) = routing.grid_size {
            target.grid_size = v;
        }
        if let Some(v) = routing.long_link_distance {
            target.long_link_distance = v;
        }
        if let Some(v) = routing.vertical_gap {
            target.vertical_gap = v;
        }
        if let Some(v) = routing.lane_hop_distance {
            target.lane_hop_distance = v;
        }
        if let Some(v) = routing.target_gap {
            target.target_gap = v;
        }
        if let Some(v) = routing.reroute_width {
            target.reroute_width = v;
        }
        if let Some(v) = routing.reroute_height {
            target.reroute_height = v;
        }
        if routing.replace_lanes.unwrap_or(false) {
            target.lanes.clear();
        }
        if let Some(lanes) = routing.lanes {
            merge_lanes(&mut target.lanes, lanes);
        }
    }
}

fn merge_lanes(lanes: &mut IndexMap<String, BusLane>, overrides: IndexMap<String, LaneFile>) {
    for (tag, lane) in overrides {
        let tag = tag.to_uppercase();
        let next_priority = lanes.values().map(|l| l.priority).max().unwrap_or(0) + 1;
        let entry = lanes.entry(tag).or_insert_with(|| BusLane {
            y: 0.0,
            color: "#888888".to_string(),
            priority: next_priority,
            aliases: Vec::new(),
        });
        if let Some(v) = lane.y {
            entry.y = v;
        }
        if let Some(v) = lane.color {
            entry.color = v;
        }
        if let Some(v) = lane.priority {
            entry.priority = v;
        }
        if let Some(v) = lane.aliases {
            entry.aliases = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lanes_follow_priority() {
        let routing = RoutingConfig::default();
        let tags: Vec<&str> = routing
            .lanes_by_priority()
            .into_iter()
            .map(|(tag, _)| tag.as_str())
            .collect();
        assert_eq!(
            tags,
            [
                "MODEL",
                "CLIP",
                "VAE",
                "IMAGE",
                "CONTEXT_PIPE",
                "CONDITIONING",
                "LATENT"
            ]
        );
        assert_eq!(routing.lanes["MODEL"].y, -130.0);
        assert_eq!(routing.lanes["CONTEXT_PIPE"].aliases, ["CONTEXT"]);
    }

    #[test]
    fn merges_partial_overrides() {
        let config = config_from_str(
            r##"{
                "gridSize": 25,
                "collision": {"minPadding": 40, "maxIterations": 10},
                "routing": {
                    "longLinkDistance": 600,
                    "lanes": {
                        "model": {"y": -400},
                        "mask": {"y": -270, "color": "#123456"}
                    }
                }
            }"##,
        )
        .unwrap();

        assert_eq!(config.layout.collision.grid_size, 25.0);
        assert_eq!(config.layout.routing.grid_size, 25.0);
        assert_eq!(config.layout.collision.min_padding, 40.0);
        assert_eq!(config.layout.collision.max_iterations, 10);
        assert_eq!(config.layout.routing.long_link_distance, 600.0);
        assert_eq!(config.layout.routing.lanes["MODEL"].y, -400.0);
        assert_eq!(config.layout.routing.lanes["MODEL"].color, "#FF6B6B");
        let mask = &config.layout.routing.lanes["MASK"];
        assert_eq!(mask.priority, 8);
        assert_eq!(mask.color, "#123456");
    }

    #[test]
    fn replace_lanes_drops_defaults() {
        let config = config_from_str(
            r#"{"routing": {"replaceLanes": true, "lanes": {"IMAGE": {"y": -500}}}}"#,
        )
        .unwrap();
        assert_eq!(config.layout.routing.lanes.len(), 1);
        assert_eq!(config.layout.routing.lanes["IMAGE"].priority, 1);
    }
}

use crate::config::{load_config, Config};
use crate::layout::{compute_layout, resolve_collisions, route_links};
use crate::parser::parse_document;
use crate::render::{render_document, render_document_string, write_output_json};
use crate::validate::validate_document;
use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "wfl",
    version,
    about = "Route long links through data-bus lanes and resolve node overlaps in workflow JSON"
)]
pub struct Args {
    /// Input workflow file (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output workflow file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Which pass to run
    #[arg(short = 'm', long = "mode", value_enum, default_value = "layout")]
    pub mode: Mode,

    /// Config file (.json or .json5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Write the pass report as JSON to this file
    #[arg(short = 'r', long = "report")]
    pub report: Option<PathBuf>,

    /// Minimum clearance between nodes and groups
    #[arg(long = "padding")]
    pub padding: Option<f64>,

    /// Grid used for snapping positions
    #[arg(long = "gridSize")]
    pub grid_size: Option<f64>,

    /// Cap on collision resolution passes
    #[arg(long = "maxIterations")]
    pub max_iterations: Option<usize>,

    /// Log more (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bus routing, then collision resolution
    Layout,
    /// Bus routing only
    Route,
    /// Collision resolution only
    Resolve,
    /// Structural checks only; nothing is written but the report
    Validate,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let input = read_input(args.input.as_deref())?;
    let mut doc = parse_document(&input)?;

    let report = match args.mode {
        Mode::Layout => to_report(&compute_layout(&mut doc, &config.layout))?,
        Mode::Route => to_report(&route_links(&mut doc, &config.layout.routing))?,
        Mode::Resolve => to_report(&resolve_collisions(&mut doc, &config.layout.collision))?,
        Mode::Validate => {
            let validation = validate_document(&doc);
            let text = serde_json::to_string_pretty(&validation)?;
            let target = args.report.as_deref().or(args.output.as_deref());
            write_output_json(&format!("{text}\n"), target)?;
            if !validation.is_valid {
                return Err(anyhow::anyhow!(
                    "Workflow has {} structural error(s)",
                    validation.errors.len()
                ));
            }
            return Ok(());
        }
    };

    let document = if config.render.pretty {
        render_document_string(&doc)?
    } else {
        format!("{}\n", serde_json::to_string(&render_document(&doc))?)
    };
    write_output_json(&document, args.output.as_deref())?;

    if let Some(path) = args.report.as_deref() {
        write_output_json(&format!("{report}\n"), Some(path))?;
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(v) = args.padding {
        config.layout.collision.min_padding = v;
    }
    if let Some(v) = args.grid_size {
        config.layout.collision.grid_size = v;
        config.layout.routing.grid_size = v;
    }
    if let Some(v) = args.max_iterations {
        config.layout.collision.max_iterations = v;
    }
}

fn to_report<T: Serialize>(report: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok(buf);
        }
        return Ok(std::fs::read_to_string(path)?);
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "wfl",
            "--mode",
            "resolve",
            "--padding",
            "40",
            "--gridSize",
            "20",
            "--maxIterations",
            "7",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(args.mode, Mode::Resolve);
        assert_eq!(config.layout.collision.min_padding, 40.0);
        assert_eq!(config.layout.collision.grid_size, 20.0);
        assert_eq!(config.layout.routing.grid_size, 20.0);
        assert_eq!(config.layout.collision.max_iterations, 7);
    }

    #[test]
    fn defaults_to_full_layout() {
        let args = Args::parse_from(["wfl", "-i", "workflow.json", "-vv"]);
        assert_eq!(args.mode, Mode::Layout);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.input.as_deref(), Some(Path::new("workflow.json")));
    }
}

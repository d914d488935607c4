//! Graph configuration.
//!
//! Config is searched for in `dagrad/graph_config.json` inside every XDG
//! config directory and then in the config home. Missing or malformed
//! config falls back to defaults. `DAGRAD_DEBUG` env variable overrides
//! the debug bitmask.

use crate::error::GraphError;
use nanoserde::DeJson;
use std::path::Path;

/// Print topological order of every traversal
pub const DEBUG_TOPO: u32 = 0b001;
/// Trace every gradient join
pub const DEBUG_GRAD: u32 = 0b010;
/// Print dot graph of every derived backward graph
pub const DEBUG_DOT: u32 = 0b100;

/// Configuration of [Graph](crate::graph::Graph)
#[derive(Debug, Clone, Default, PartialEq, Eq, DeJson)]
pub struct GraphConfig {
    /// Debug bitmask, see [DEBUG_TOPO], [DEBUG_GRAD] and [DEBUG_DOT]
    #[nserde(default)]
    pub debug: u32,
}

impl GraphConfig {
    /// Load config from XDG config directories and env variables.
    /// Never fails, falls back to defaults.
    #[must_use]
    pub fn load() -> Self {
        let mut config = xdg::BaseDirectories::new()
            .map_err(|e| log::debug!("Failed to find config directories for graph config, {e}"))
            .ok()
            .map(|bd| {
                let mut dirs = bd.get_config_dirs();
                dirs.push(bd.get_config_home());
                dirs
            })
            .and_then(|paths| {
                paths.into_iter().find_map(|mut path| {
                    path.push("dagrad/graph_config.json");
                    Self::from_file(&path)
                        .map_err(|e| log::debug!("Skipping {}: {e}", path.display()))
                        .ok()
                })
            })
            .inspect(|_| log::debug!("Graph config successfully read and parsed."))
            .unwrap_or_else(|| {
                log::debug!("Failed to get graph config, using defaults.");
                Self::default()
            });
        config.apply_env();
        config
    }

    /// Read config from json file.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let file = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("failed to read {}, {e}", path.display())))?;
        Self::from_json(&file)
    }

    /// Parse config from json string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Self::deserialize_json(json)
            .map_err(|e| GraphError::Config(format!("failed to parse, {e:?}")))
    }

    fn apply_env(&mut self) {
        if let Ok(x) = std::env::var("DAGRAD_DEBUG") {
            if let Ok(x) = x.parse::<u32>() {
                self.debug = x;
            }
        }
    }

    pub(crate) const fn debug_topo(&self) -> bool {
        self.debug & DEBUG_TOPO != 0
    }

    pub(crate) const fn debug_grad(&self) -> bool {
        self.debug & DEBUG_GRAD != 0
    }

    pub(crate) const fn debug_dot(&self) -> bool {
        self.debug & DEBUG_DOT != 0
    }
}

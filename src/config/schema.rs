//! KDL schema for the server settings in config.kdl.
//!
//! Settings are top-level nodes next to the `command` tree:
//!
//! ```kdl
//! program "/usr/local/bin/archivy"
//! host "0.0.0.0"
//! port 8080
//! output-dir "/var/tmp/cliweb"
//! hidden "shell" "run"
//! index-title "Plugins"
//! ```
//!
//! Every setting is optional; unset values are filled in by the resolver.

use kdl::{KdlDocument, KdlNode, KdlValue};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// File name of the config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Default location: `~/.config/cliweb/config.kdl`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cliweb").join(CONFIG_FILE_NAME))
}

/// Server settings read from config.kdl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CliWebConfig {
    /// Executable to run; the root command's name when unset
    pub program: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Shared root for per-request temp directories
    pub output_dir: Option<PathBuf>,
    /// Commands left out of the index and refused by the endpoints
    pub hidden: Vec<String>,
    pub index_title: Option<String>,
}

impl CliWebConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a KDL document, ignoring unknown nodes.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();

        for node in doc.nodes() {
            match node.name().value() {
                "program" => config.program = get_string_arg(node),
                "host" => config.host = get_string_arg(node),
                "port" => {
                    let port = get_integer_arg(node)
                        .ok_or_else(|| Error::InvalidConfig("port must be an integer".to_string()))?;
                    let port = u16::try_from(port)
                        .map_err(|_| Error::InvalidConfig(format!("port out of range: {}", port)))?;
                    config.port = Some(port);
                }
                "output-dir" => config.output_dir = get_string_arg(node).map(PathBuf::from),
                "hidden" => config.hidden.extend(get_string_args(node)),
                "index-title" => config.index_title = get_string_arg(node),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Validate the values that were set.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.port == Some(0) {
            return Err("port must be non-zero".to_string());
        }
        if matches!(self.program.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err("program must not be empty".to_string());
        }
        if matches!(self.host.as_deref(), Some(h) if h.trim().is_empty()) {
            return Err("host must not be empty".to_string());
        }
        Ok(())
    }
}

/// Read and parse a KDL file.
pub fn read_document(path: &Path) -> Result<KdlDocument> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::InvalidConfig(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(content.parse::<KdlDocument>()?)
}

/// First positional argument as a string.
pub(crate) fn get_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Every positional string argument.
pub(crate) fn get_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

/// A named property's value.
pub(crate) fn get_property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

/// A property value rendered as text. Null yields `None`.
pub(crate) fn value_text(value: &KdlValue) -> Option<String> {
    match value {
        KdlValue::String(s) => Some(s.clone()),
        KdlValue::Integer(i) => Some(i.to_string()),
        KdlValue::Float(f) => Some(f.to_string()),
        KdlValue::Bool(b) => Some(b.to_string()),
        KdlValue::Null => None,
    }
}

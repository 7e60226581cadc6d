//! Configuration for cliweb.
//!
//! A single KDL file holds both the server settings and the command tree to
//! serve. It is located at `~/.config/cliweb/config.kdl` unless `--config` or
//! `CLIWEB_CONFIG` names another file.
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;
pub mod tree;

pub use resolver::{
    CONFIG_ENV, ConfigOverrides, LoadedConfig, Resolved, ResolvedSettings, ValueSource,
    load_config, load_config_with_env, resolve_settings,
};
pub use schema::{CliWebConfig, default_config_path};
pub use tree::parse_command_tree;

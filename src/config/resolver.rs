//! Precedence resolution for server settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`CLIWEB_HOST`, `CLIWEB_PORT`, `CLIWEB_OUTPUT_DIR`)
//! 3. config.kdl
//! 4. Built-in defaults

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::bridge::tree::CommandNode;
use crate::config::schema::{CliWebConfig, read_document};
use crate::config::tree::parse_command_tree;
use crate::{Error, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CLIWEB_CONFIG";
pub const HOST_ENV: &str = "CLIWEB_HOST";
pub const PORT_ENV: &str = "CLIWEB_PORT";
pub const OUTPUT_DIR_ENV: &str = "CLIWEB_OUTPUT_DIR";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_INDEX_TITLE: &str = "Commands";

/// Default output root: `<tmp>/cli-web`.
pub fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("cli-web")
}

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from config.kdl
    ConfigFile,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub program: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSettings {
    pub program: Resolved<String>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub output_dir: Resolved<PathBuf>,
    pub hidden: Vec<String>,
    pub index_title: Resolved<String>,
}

impl ResolvedSettings {
    /// Settings for a tree with no config file: all defaults, program named
    /// after the root command.
    pub fn defaults_for(root_name: &str) -> Self {
        Self {
            program: Resolved::new(root_name.to_string(), ValueSource::Default),
            host: Resolved::new(DEFAULT_HOST.to_string(), ValueSource::Default),
            port: Resolved::new(DEFAULT_PORT, ValueSource::Default),
            output_dir: Resolved::new(default_output_dir(), ValueSource::Default),
            hidden: Vec::new(),
            index_title: Resolved::new(DEFAULT_INDEX_TITLE.to_string(), ValueSource::Default),
        }
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.iter().any(|h| h == name)
    }
}

/// Settings and command tree loaded from one config file.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub settings: ResolvedSettings,
    pub tree: CommandNode,
}

/// Load a config file and resolve its settings against the process
/// environment and `overrides`.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<LoadedConfig> {
    load_config_with_env(path, overrides, |key| std::env::var(key).ok())
}

/// Like [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env<F>(path: &Path, overrides: &ConfigOverrides, env: F) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let doc = read_document(path)?;
    let file = CliWebConfig::from_kdl(&doc)?;
    file.validate()
        .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
    let tree = parse_command_tree(&doc)?;
    let settings = resolve_settings(&file, &tree.name, overrides, env)?;

    tracing::debug!(
        path = %path.display(),
        host = %settings.host.value,
        port = settings.port.value,
        output_dir = %settings.output_dir.value.display(),
        "loaded config"
    );

    Ok(LoadedConfig {
        path: path.to_path_buf(),
        settings,
        tree,
    })
}

/// Resolve settings with full precedence chain.
pub fn resolve_settings<F>(
    file: &CliWebConfig,
    root_name: &str,
    overrides: &ConfigOverrides,
    env: F,
) -> Result<ResolvedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = ResolvedSettings::defaults_for(root_name);
    let env_value = |key: &str| env(key).filter(|v| !v.is_empty());

    // program has no environment variable
    if let Some(ref program) = overrides.program {
        result.program = Resolved::new(program.clone(), ValueSource::CliFlag);
    } else if let Some(ref program) = file.program {
        result.program = Resolved::new(program.clone(), ValueSource::ConfigFile);
    }

    if let Some(ref host) = overrides.host {
        result.host = Resolved::new(host.clone(), ValueSource::CliFlag);
    } else if let Some(host) = env_value(HOST_ENV) {
        result.host = Resolved::new(host, ValueSource::EnvVar(HOST_ENV.to_string()));
    } else if let Some(ref host) = file.host {
        result.host = Resolved::new(host.clone(), ValueSource::ConfigFile);
    }

    if let Some(port) = overrides.port {
        result.port = Resolved::new(port, ValueSource::CliFlag);
    } else if let Some(port) = env_value(PORT_ENV) {
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidConfig(format!("{}={}: {}", PORT_ENV, port, e)))?;
        result.port = Resolved::new(port, ValueSource::EnvVar(PORT_ENV.to_string()));
    } else if let Some(port) = file.port {
        result.port = Resolved::new(port, ValueSource::ConfigFile);
    }

    if let Some(ref dir) = overrides.output_dir {
        result.output_dir = Resolved::new(dir.clone(), ValueSource::CliFlag);
    } else if let Some(dir) = env_value(OUTPUT_DIR_ENV) {
        result.output_dir =
            Resolved::new(PathBuf::from(dir), ValueSource::EnvVar(OUTPUT_DIR_ENV.to_string()));
    } else if let Some(ref dir) = file.output_dir {
        result.output_dir = Resolved::new(dir.clone(), ValueSource::ConfigFile);
    }

    if let Some(ref title) = file.index_title {
        result.index_title = Resolved::new(title.clone(), ValueSource::ConfigFile);
    }
    result.hidden = file.hidden.clone();

    if result.port.value == 0 {
        return Err(Error::InvalidConfig("port must be non-zero".to_string()));
    }
    if result.program.value.trim().is_empty() {
        return Err(Error::InvalidConfig("program must not be empty".to_string()));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn file_config() -> CliWebConfig {
        CliWebConfig {
            program: Some("/opt/tool".to_string()),
            host: Some("0.0.0.0".to_string()),
            port: Some(8080),
            output_dir: Some(PathBuf::from("/srv/out")),
            hidden: vec!["shell".to_string()],
            index_title: Some("Plugins".to_string()),
        }
    }

    #[test]
    fn test_defaults() {
        let settings =
            resolve_settings(&CliWebConfig::new(), "tool", &ConfigOverrides::new(), no_env).unwrap();
        assert_eq!(settings.program.value, "tool");
        assert_eq!(settings.host.value, DEFAULT_HOST);
        assert_eq!(settings.port.value, DEFAULT_PORT);
        assert_eq!(settings.output_dir.value, default_output_dir());
        assert_eq!(settings.index_title.value, "Commands");
        assert_eq!(settings.port.source, ValueSource::Default);
    }

    #[test]
    fn test_config_file_beats_defaults() {
        let settings = resolve_settings(&file_config(), "tool", &ConfigOverrides::new(), no_env).unwrap();
        assert_eq!(settings.program, Resolved::new("/opt/tool".to_string(), ValueSource::ConfigFile));
        assert_eq!(settings.port.value, 8080);
        assert!(settings.is_hidden("shell"));
        assert!(!settings.is_hidden("add"));
    }

    #[test]
    fn test_env_beats_config_file() {
        let env: HashMap<&str, &str> = [(PORT_ENV, "9000"), (HOST_ENV, "::1")].into_iter().collect();
        let settings = resolve_settings(&file_config(), "tool", &ConfigOverrides::new(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(settings.port.value, 9000);
        assert_eq!(settings.port.source, ValueSource::EnvVar(PORT_ENV.to_string()));
        assert_eq!(settings.host.value, "::1");
        assert_eq!(settings.output_dir.source, ValueSource::ConfigFile);
    }

    #[test]
    fn test_cli_beats_env() {
        let overrides = ConfigOverrides::new()
            .with_port(7000)
            .with_output_dir("/cli/out")
            .with_program("other");
        let settings = resolve_settings(&file_config(), "tool", &overrides, |k| {
            (k == PORT_ENV).then(|| "9000".to_string())
        })
        .unwrap();
        assert_eq!(settings.port, Resolved::new(7000, ValueSource::CliFlag));
        assert_eq!(settings.output_dir.value, PathBuf::from("/cli/out"));
        assert_eq!(settings.program.value, "other");
    }

    #[test]
    fn test_invalid_env_port() {
        let result = resolve_settings(&CliWebConfig::new(), "tool", &ConfigOverrides::new(), |k| {
            (k == PORT_ENV).then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let settings = resolve_settings(&file_config(), "tool", &ConfigOverrides::new(), |_| {
            Some(String::new())
        })
        .unwrap();
        assert_eq!(settings.host.source, ValueSource::ConfigFile);
    }

    #[test]
    fn test_value_source_display() {
        assert_eq!(ValueSource::CliFlag.to_string(), "cli");
        assert_eq!(ValueSource::EnvVar(PORT_ENV.to_string()).to_string(), "env:CLIWEB_PORT");
        assert_eq!(ValueSource::ConfigFile.to_string(), "config");
        assert_eq!(ValueSource::Default.to_string(), "default");
    }

    #[test]
    fn test_load_config_reads_settings_and_tree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(
            &path,
            r#"
            port 6000
            hidden "secret"
            command "tool" {
                command "echo" { argument "msg"; }
                command "secret"
            }
            "#,
        )
        .unwrap();

        let loaded = load_config_with_env(&path, &ConfigOverrides::new(), no_env).unwrap();
        assert_eq!(loaded.tree.name, "tool");
        assert_eq!(loaded.tree.children.len(), 2);
        assert_eq!(loaded.settings.port.value, 6000);
        assert_eq!(loaded.settings.program.value, "tool");
        assert!(loaded.settings.is_hidden("secret"));
    }

    #[test]
    fn test_load_config_requires_tree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, "port 6000\n").unwrap();
        assert!(load_config_with_env(&path, &ConfigOverrides::new(), no_env).is_err());
    }
}

//! CLI argument definitions for cliweb.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::resolver::ConfigOverrides;

/// Version string with the commit and build time injected by build.rs.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CLIWEB_GIT_COMMIT"),
    " ",
    env!("CLIWEB_BUILD_TIMESTAMP"),
    ")"
);

/// cliweb - Serve a command-line tool as a web UI.
///
/// Every command of the configured tree gets a generated form; submitting it
/// runs the tool and streams its output back.
#[derive(Parser, Debug)]
#[command(name = "cliweb")]
#[command(author, version = VERSION, about = "Serve a hierarchical command-line tool as a web UI", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Path to the config file declaring settings and the command tree.
    /// Defaults to ~/.config/cliweb/config.kdl.
    #[arg(short, long, global = true, env = "CLIWEB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Address to bind (env: CLIWEB_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (env: CLIWEB_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for uploads and results (env: CLIWEB_OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Executable to run instead of the root command's name
        #[arg(long)]
        program: Option<String>,
    },

    /// Print the command index as JSON
    Tree {
        /// Include the resolved settings and where each value came from
        #[arg(long)]
        show_config: bool,
    },

    /// Print the generated form schema for a command path as JSON
    Form {
        /// Slash-separated path below the root, e.g. `db/migrate`. Empty for the root.
        #[arg(default_value = "")]
        path: String,
    },
}

impl Commands {
    /// CLI overrides carried by this command.
    pub fn overrides(&self) -> ConfigOverrides {
        match self {
            Commands::Serve {
                host,
                port,
                output_dir,
                program,
            } => ConfigOverrides {
                program: program.clone(),
                host: host.clone(),
                port: *port,
                output_dir: output_dir.clone(),
            },
            Commands::Tree { .. } | Commands::Form { .. } => ConfigOverrides::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from([
            "cliweb", "-vv", "serve", "--port", "8080", "--host", "0.0.0.0", "--program", "tool",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let overrides = cli.command.overrides();
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.program.as_deref(), Some("tool"));
        assert!(overrides.output_dir.is_none());
    }

    #[test]
    fn test_parse_form_path_and_global_flags() {
        let cli = Cli::try_parse_from([
            "cliweb", "form", "db/migrate", "--log-format", "json", "--config", "/tmp/c.kdl",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.kdl")));
        match cli.command {
            Commands::Form { path } => assert_eq!(path, "db/migrate"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_form_path_defaults_to_root() {
        let cli = Cli::try_parse_from(["cliweb", "form"]).unwrap();
        assert!(matches!(cli.command, Commands::Form { ref path } if path.is_empty()));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_from(["cliweb", "serve", "--port", "http"]).is_err());
    }
}

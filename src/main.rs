//! cliweb CLI - Serve a hierarchical command-line tool as a web UI.

use clap::Parser;
use cliweb::bridge::{FormGenerator, command_index, resolve_path};
use cliweb::cli::{Cli, Commands, LogFormat};
use cliweb::config::{self, LoadedConfig};
use cliweb::web::{AppState, start_server};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli) {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the tracing subscriber. Logs go to stderr so JSON output on stdout
/// stays clean.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cliweb=info",
        1 => "cliweb=debug",
        _ => "cliweb=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Config file location: --config flag or CLIWEB_CONFIG, else the default.
fn resolve_config_path(explicit: Option<PathBuf>) -> cliweb::Result<PathBuf> {
    explicit.or_else(config::default_config_path).ok_or_else(|| {
        cliweb::Error::InvalidConfig(
            "no config file given and no config directory found; use --config".to_string(),
        )
    })
}

fn run(cli: Cli) -> cliweb::Result<()> {
    let path = resolve_config_path(cli.config)?;
    let loaded = config::load_config(&path, &cli.command.overrides())?;

    match cli.command {
        Commands::Serve { .. } => run_server(loaded),
        Commands::Tree { show_config } => print_tree(&loaded, show_config),
        Commands::Form { path } => print_form(&loaded, &path),
    }
}

fn run_server(loaded: LoadedConfig) -> cliweb::Result<()> {
    let state = AppState::new(Arc::new(loaded.tree), loaded.settings);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| cliweb::Error::Other(format!("Failed to create runtime: {}", e)))?
        .block_on(start_server(state))
}

fn print_tree(loaded: &LoadedConfig, show_config: bool) -> cliweb::Result<()> {
    let index = command_index(&loaded.tree, &loaded.settings.hidden);
    let value = if show_config {
        serde_json::json!({
            "config": loaded.path,
            "settings": loaded.settings,
            "tree": index,
        })
    } else {
        serde_json::to_value(&index)?
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_form(loaded: &LoadedConfig, path: &str) -> cliweb::Result<()> {
    let rest = path.trim_matches('/');
    let full = if rest.is_empty() {
        loaded.tree.name.clone()
    } else {
        format!("{}/{}", loaded.tree.name, rest)
    };
    let chain = resolve_path(&loaded.tree, &full)?;
    let levels = FormGenerator::new().generate(&chain)?;
    println!("{}", serde_json::to_string_pretty(&levels)?);
    Ok(())
}

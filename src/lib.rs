//! cliweb - Serve a hierarchical command-line tool as a web UI.
//!
//! The library walks a command tree, generates an HTML form per command,
//! translates submitted forms back into an argument vector and streams the
//! output of the spawned process to the browser.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod web;

/// Library-level error type for cliweb operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Kdl(#[from] kdl::KdlError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("Malformed field: {0}")]
    MalformedField(String),

    #[error("Missing upload for {0}")]
    MissingUpload(String),

    #[error("Command is hidden: {0}")]
    HiddenCommand(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cliweb operations.
pub type Result<T> = std::result::Result<T, Error>;

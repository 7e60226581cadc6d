//! Common test utilities for cliweb integration tests.
//!
//! Provides `TestEnv` for isolated config files and output directories, plus
//! helpers to drive the router without opening a socket.

#![allow(dead_code)]

use assert_cmd::Command;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

use cliweb::bridge::{Arity, CommandNode, DefaultValue, ParameterSpec, ValueKind};
use cliweb::config::ResolvedSettings;
use cliweb::config::resolver::{Resolved, ValueSource};
use cliweb::web::{AppState, router};

pub use tempfile::TempDir;

pub const BOUNDARY: &str = "cliweb-test-boundary";

/// A test environment with its own config file and output directory.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.kdl")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Write config.kdl and return its path.
    pub fn write_config(&self, kdl: &str) -> PathBuf {
        let path = self.config_path();
        std::fs::write(&path, kdl).unwrap();
        path
    }

    /// Get a Command for the cliweb binary reading this environment's config.
    pub fn cliweb(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cliweb"));
        cmd.current_dir(self.dir.path());
        cmd.env("CLIWEB_CONFIG", self.config_path());
        cmd.env_remove("CLIWEB_HOST");
        cmd.env_remove("CLIWEB_PORT");
        cmd.env_remove("CLIWEB_OUTPUT_DIR");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Router serving `tree`, running `program` for every execution.
    pub fn app(&self, tree: CommandNode, program: &str, hidden: &[&str]) -> Router {
        let mut settings = ResolvedSettings::defaults_for(&tree.name);
        settings.program = Resolved::new(program.to_string(), ValueSource::CliFlag);
        settings.output_dir = Resolved::new(self.output_dir(), ValueSource::CliFlag);
        settings.hidden = hidden.iter().map(|s| s.to_string()).collect();
        std::fs::create_dir_all(self.output_dir()).unwrap();
        router(AppState::new(Arc::new(tree), settings))
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// The tree used by most web tests. The program is `env`, so the first
/// subcommand name is run as a program: `tool echo hi` runs `echo hi`.
pub fn sample_tree() -> CommandNode {
    CommandNode::group("tool")
        .with_help("Test tool")
        .with_child(
            CommandNode::command("echo")
                .with_help("Print the arguments")
                .with_param(ParameterSpec::argument("msg"))
                .with_param(
                    ParameterSpec::flag("verbose", "--verbose", Some("--no-verbose"))
                        .with_default(DefaultValue::Flag(true)),
                ),
        )
        .with_child(
            CommandNode::command("sh")
                .with_param(ParameterSpec::option("script").with_literal("-c"))
                .with_param(ParameterSpec::argument("dst").with_value_kind(ValueKind::WritableDir)),
        )
        .with_child(
            CommandNode::command("cat")
                .with_param(ParameterSpec::argument("input").with_value_kind(ValueKind::ReadableFile)),
        )
        .with_child(
            CommandNode::command("printf")
                .with_param(ParameterSpec::argument("lines").with_arity(Arity::Variadic)),
        )
        .with_child(CommandNode::command("shell"))
}

/// Percent-encode everything but unreserved characters.
pub fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
            _ => format!("%{:02X}", b),
        })
        .collect()
}

/// An urlencoded form body from ordered pairs.
pub fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// A multipart body with text fields and `(name, filename, data)` files.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_form(app: &Router, uri: &str, pairs: &[(&str, &str)]) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(pairs)))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_multipart(app: &Router, uri: &str, body: Vec<u8>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Every `href` target in an HTML fragment.
pub fn hrefs(html: &str) -> Vec<String> {
    html.split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

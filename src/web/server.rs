//! Web server exposing the command tree.
//!
//! - `GET /` lists the commands
//! - `GET /cli/<path>` renders the form of a command
//! - `POST /cli/<path>` runs it and streams the output
//! - `/static/results/` serves result files
//!
//! `/cli` with no further path addresses the root command.

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path as AxumPath, Request, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::bridge::artifacts::{RESULTS_MOUNT, RequestWorkspace, Upload};
use crate::bridge::index::{CLI_MOUNT, command_index};
use crate::bridge::request::{RequestToArgs, SubmittedForm};
use crate::bridge::runner::{Framing, execute};
use crate::bridge::tree::{CommandSource, resolve_path};
use crate::bridge::form::FormGenerator;
use crate::config::ResolvedSettings;
use crate::web::render;
use crate::{Error, Result};

/// Largest accepted request body, uploads included.
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Root of the served command tree
    pub root: Arc<dyn CommandSource>,
    pub settings: Arc<ResolvedSettings>,
    pub forms: Arc<FormGenerator>,
}

impl AppState {
    pub fn new(root: Arc<dyn CommandSource>, settings: ResolvedSettings) -> Self {
        Self {
            root,
            settings: Arc::new(settings),
            forms: Arc::new(FormGenerator::new()),
        }
    }

    /// Use a custom form generator, e.g. one with extra input handlers.
    pub fn with_forms(mut self, forms: FormGenerator) -> Self {
        self.forms = Arc::new(forms);
        self
    }

    /// Full command path for the part of the URL below `/cli`, refusing
    /// hidden commands.
    fn command_path(&self, rest: &str) -> Result<String> {
        let rest = rest.trim_matches('/');
        if let Some(hidden) = rest.split('/').find(|s| self.settings.is_hidden(s)) {
            return Err(Error::HiddenCommand(hidden.to_string()));
        }
        if rest.is_empty() {
            Ok(self.root.name().to_string())
        } else {
            Ok(format!("{}/{}", self.root.name(), rest))
        }
    }
}

/// Error response with a status derived from the error kind.
pub struct AppError(Error);

impl<E: Into<Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        (status, self.0.to_string()).into_response()
    }
}

/// HTTP status for an error.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::CommandNotFound(_) => StatusCode::NOT_FOUND,
        Error::MalformedField(_) | Error::MissingUpload(_) | Error::HiddenCommand(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let results = ServeDir::new(&state.settings.output_dir.value);
    Router::new()
        .route("/", get(serve_index))
        .route(CLI_MOUNT, get(show_root_form).post(execute_root))
        .route(&format!("{}/*command_path", CLI_MOUNT), get(show_form).post(execute_command))
        .nest_service(RESULTS_MOUNT, results)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Start the web server and run until it fails.
pub async fn start_server(state: AppState) -> Result<()> {
    let settings = state.settings.clone();
    let host: std::net::IpAddr = settings.host.value.parse().map_err(|e| {
        Error::InvalidConfig(format!("Invalid host address '{}': {}", settings.host.value, e))
    })?;
    let addr = SocketAddr::from((host, settings.port.value));

    std::fs::create_dir_all(&settings.output_dir.value)?;
    tracing::info!(
        %addr,
        output_dir = %settings.output_dir.value.display(),
        program = %settings.program.value,
        "starting server"
    );
    println!("Serving {} at http://{}", state.root.name(), addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn serve_index(State(state): State<AppState>) -> std::result::Result<Html<String>, AppError> {
    let index = command_index(state.root.as_ref(), &state.settings.hidden);
    Ok(Html(render::index_page(&state.settings.index_title.value, &index)?))
}

async fn show_root_form(State(state): State<AppState>) -> std::result::Result<Html<String>, AppError> {
    form_response(&state, "")
}

async fn show_form(
    State(state): State<AppState>,
    AxumPath(command_path): AxumPath<String>,
) -> std::result::Result<Html<String>, AppError> {
    form_response(&state, &command_path)
}

fn form_response(state: &AppState, rest: &str) -> std::result::Result<Html<String>, AppError> {
    let path = state.command_path(rest)?;
    let chain = resolve_path(state.root.as_ref(), &path)?;
    let levels = state.forms.generate(&chain)?;
    let action = action_url(rest);
    Ok(Html(render::form_page(&path, &action, &levels)?))
}

fn action_url(rest: &str) -> String {
    let rest = rest.trim_matches('/');
    if rest.is_empty() {
        CLI_MOUNT.to_string()
    } else {
        format!("{}/{}", CLI_MOUNT, rest)
    }
}

async fn execute_root(
    State(state): State<AppState>,
    request: Request,
) -> std::result::Result<Response, AppError> {
    run_command(state, String::new(), request).await
}

async fn execute_command(
    State(state): State<AppState>,
    AxumPath(command_path): AxumPath<String>,
    request: Request,
) -> std::result::Result<Response, AppError> {
    run_command(state, command_path, request).await
}

async fn run_command(
    state: AppState,
    rest: String,
    request: Request,
) -> std::result::Result<Response, AppError> {
    let path = state.command_path(&rest)?;
    resolve_path(state.root.as_ref(), &path)?;

    let form = read_form(request).await?;
    let root = state.root.clone();
    let command = path.clone();
    let output_root = state.settings.output_dir.value.clone();
    let program = state.settings.program.value.clone();

    // Uploads are written and unpacked here, before anything is spawned.
    let (argv, args) = tokio::task::spawn_blocking(move || {
        let chain = resolve_path(root.as_ref(), &command)?;
        let mut args = RequestToArgs::new(&form, RequestWorkspace::new(output_root))?;
        args.check_flags(&chain)?;
        let argv = args.build_argv(&program, &chain.names())?;
        Ok::<_, Error>((argv, args))
    })
    .await
    .map_err(|e| Error::Other(format!("translation task failed: {}", e)))??;

    tracing::info!(command = %path, argv = ?argv, "executing command");
    let stream = execute(argv, args, Framing::new(path));
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Read a multipart or urlencoded submission.
async fn read_form(request: Request) -> Result<SubmittedForm> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let axum::Form(values) = axum::Form::<Vec<(String, String)>>::from_request(request, &())
            .await
            .map_err(|e| Error::MalformedField(e.body_text()))?;
        return Ok(SubmittedForm {
            values,
            uploads: Vec::new(),
        });
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| Error::MalformedField(e.body_text()))?;
    let mut form = SubmittedForm::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::MalformedField(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::MalformedField(e.body_text()))?;
                form.uploads.push(Upload {
                    field: name,
                    filename,
                    data: data.to_vec(),
                });
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::MalformedField(e.body_text()))?;
                form.values.push((name, text));
            }
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tree::CommandNode;

    fn state(hidden: &[&str]) -> AppState {
        let root = CommandNode::group("tool")
            .with_child(CommandNode::command("echo"))
            .with_child(CommandNode::command("shell"));
        let mut settings = ResolvedSettings::defaults_for("tool");
        settings.hidden = hidden.iter().map(|s| s.to_string()).collect();
        AppState::new(Arc::new(root), settings)
    }

    #[test]
    fn test_command_path_prefixes_root() {
        let state = state(&[]);
        assert_eq!(state.command_path("").unwrap(), "tool");
        assert_eq!(state.command_path("echo").unwrap(), "tool/echo");
        assert_eq!(state.command_path("echo/").unwrap(), "tool/echo");
    }

    #[test]
    fn test_command_path_refuses_hidden() {
        let state = state(&["shell"]);
        assert!(matches!(state.command_path("shell"), Err(Error::HiddenCommand(_))));
        assert!(state.command_path("echo").is_ok());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::CommandNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::MalformedField("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::MissingUpload("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::HiddenCommand("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::UnsupportedParameter("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_action_url() {
        assert_eq!(action_url(""), "/cli");
        assert_eq!(action_url("db/migrate/"), "/cli/db/migrate");
    }
}

//! Web front end: routes, handlers and page rendering.

pub mod render;
pub mod server;

pub use server::{AppError, AppState, router, start_server, status_for};

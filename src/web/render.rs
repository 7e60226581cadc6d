//! HTML rendering for the index and command forms.
//!
//! Pages are minijinja templates. Values are escaped with [`escape_html`]
//! unless marked safe, so form names and paths keep their slashes.

use std::fmt::Write;

use minijinja::{Environment, ErrorKind, Output, State, Value, context};

use crate::Result;
use crate::bridge::escape_html;
use crate::bridge::form::{FormField, FormLevel};
use crate::bridge::index::IndexEntry;

const TEMPLATES: [(&str, &str); 4] = [
    ("base.html", include_str!("templates/base.html")),
    ("index.html", include_str!("templates/index.html")),
    ("form.html", include_str!("templates/form.html")),
    ("field.html", include_str!("templates/field.html")),
];

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_formatter(format_value);
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// `none` and undefined values render as nothing.
fn format_value(
    out: &mut Output<'_>,
    _state: &State<'_, '_>,
    value: &Value,
) -> std::result::Result<(), minijinja::Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(());
    }
    let written = if value.is_safe() {
        write!(out, "{}", value)
    } else {
        write!(out, "{}", escape_html(&value.to_string()))
    };
    written.map_err(|e| minijinja::Error::new(ErrorKind::WriteFailure, e.to_string()))
}

fn render(name: &str, ctx: Value) -> Result<String> {
    let env = environment()?;
    Ok(env.get_template(name)?.render(ctx)?)
}

/// The command index page.
pub fn index_page(title: &str, index: &IndexEntry) -> Result<String> {
    render("index.html", context! { title, index })
}

/// The form page for a resolved command path.
pub fn form_page(command_path: &str, action: &str, levels: &[FormLevel]) -> Result<String> {
    render("form.html", context! { title => command_path, action, levels })
}

/// Render one input with its label and help.
pub fn render_field(field: &FormField) -> Result<String> {
    render("field.html", context! { field })
}

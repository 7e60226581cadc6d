//! Form schema generation.
//!
//! Each parameter is classified by an ordered chain of input handlers; the
//! first handler that claims a parameter decides how it is rendered. The order
//! is significant: choices win over everything, flags are checked before any
//! value-carrying type, and directories before files before plain text.

use serde::{Serialize, Serializer};
use std::fmt::Display;

use crate::bridge::escape_html;
use crate::bridge::field_id::{FieldId, FormKind, ValueType};
use crate::bridge::tree::{Arity, CommandChain, ParamKind, ParameterSpec, ValueKind};
use crate::{Error, Result};

/// Type-specific rendering attributes produced by an [`InputHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAttrs {
    pub form_kind: FormKind,
    pub value_type: ValueType,
    pub choices: Vec<String>,
    pub step: Option<&'static str>,
    pub accept: Option<&'static str>,
}

impl TypeAttrs {
    fn new(form_kind: FormKind, value_type: ValueType) -> Self {
        Self {
            form_kind,
            value_type,
            choices: Vec::new(),
            step: None,
            accept: None,
        }
    }
}

/// Turns one kind of parameter into form input attributes.
pub trait InputHandler: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this handler takes responsibility for `param`.
    fn claims(&self, param: &ParameterSpec) -> bool;

    fn type_attrs(&self, param: &ParameterSpec) -> TypeAttrs;
}

pub struct ChoiceInput;

impl InputHandler for ChoiceInput {
    fn name(&self) -> &'static str {
        "choice"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.kind != ParamKind::Flag && matches!(param.value_kind, ValueKind::Choice(_))
    }

    fn type_attrs(&self, param: &ParameterSpec) -> TypeAttrs {
        let mut attrs = TypeAttrs::new(FormKind::Select, ValueType::Choice);
        if let ValueKind::Choice(choices) = &param.value_kind {
            attrs.choices = choices.clone();
        }
        attrs
    }
}

pub struct FlagInput;

impl InputHandler for FlagInput {
    fn name(&self) -> &'static str {
        "flag"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.kind == ParamKind::Flag
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        TypeAttrs::new(FormKind::Checkbox, ValueType::BoolFlag)
    }
}

pub struct IntInput;

impl InputHandler for IntInput {
    fn name(&self) -> &'static str {
        "int"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.value_kind == ValueKind::Integer
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        let mut attrs = TypeAttrs::new(FormKind::Number, ValueType::Int);
        attrs.step = Some("1");
        attrs
    }
}

pub struct FloatInput;

impl InputHandler for FloatInput {
    fn name(&self) -> &'static str {
        "float"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.value_kind == ValueKind::Float
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        let mut attrs = TypeAttrs::new(FormKind::Number, ValueType::Float);
        attrs.step = Some("any");
        attrs
    }
}

/// Input directories are uploaded as zip archives; output directories are
/// created server side and never shown.
pub struct FolderInput;

impl InputHandler for FolderInput {
    fn name(&self) -> &'static str {
        "folder"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        matches!(param.value_kind, ValueKind::ReadableDir | ValueKind::WritableDir)
    }

    fn type_attrs(&self, param: &ParameterSpec) -> TypeAttrs {
        if param.value_kind == ValueKind::ReadableDir {
            let mut attrs = TypeAttrs::new(FormKind::File, ValueType::Path { writable: false });
            attrs.accept = Some("application/zip");
            attrs
        } else {
            TypeAttrs::new(FormKind::Hidden, ValueType::Path { writable: true })
        }
    }
}

/// Output files that are required are hidden; optional ones ask for a file
/// name which doubles as the download name.
pub struct FileInput;

impl InputHandler for FileInput {
    fn name(&self) -> &'static str {
        "file"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        matches!(param.value_kind, ValueKind::ReadableFile | ValueKind::WritableFile)
    }

    fn type_attrs(&self, param: &ParameterSpec) -> TypeAttrs {
        if param.value_kind == ValueKind::ReadableFile {
            TypeAttrs::new(FormKind::File, ValueType::File { writable: false })
        } else if param.required {
            TypeAttrs::new(FormKind::Hidden, ValueType::File { writable: true })
        } else {
            TypeAttrs::new(FormKind::Text, ValueType::File { writable: true })
        }
    }
}

pub struct EmailInput;

impl InputHandler for EmailInput {
    fn name(&self) -> &'static str {
        "email"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.value_kind == ValueKind::Email
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        TypeAttrs::new(FormKind::Email, ValueType::Email)
    }
}

pub struct PasswordInput;

impl InputHandler for PasswordInput {
    fn name(&self) -> &'static str {
        "password"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.value_kind == ValueKind::Password
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        TypeAttrs::new(FormKind::Password, ValueType::Password)
    }
}

pub struct DefaultInput;

impl InputHandler for DefaultInput {
    fn name(&self) -> &'static str {
        "text"
    }

    fn claims(&self, param: &ParameterSpec) -> bool {
        param.value_kind == ValueKind::Text
    }

    fn type_attrs(&self, _param: &ParameterSpec) -> TypeAttrs {
        TypeAttrs::new(FormKind::Text, ValueType::Text)
    }
}

fn display<T: Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Everything a template needs to render one form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    /// Encoded [`FieldId`], used as the input's `name`
    pub name: String,
    #[serde(serialize_with = "display")]
    pub param_kind: ParamKind,
    #[serde(serialize_with = "display")]
    pub form_kind: FormKind,
    #[serde(serialize_with = "display")]
    pub value_type: ValueType,
    #[serde(serialize_with = "display")]
    pub arity: Arity,
    /// Number of inputs rendered for the field
    pub input_count: usize,
    pub required: bool,
    pub label: String,
    pub help: Option<String>,
    /// Pre-filled value
    pub value: Option<String>,
    pub checked: bool,
    pub choices: Vec<String>,
    pub step: Option<&'static str>,
    pub accept: Option<&'static str>,
    pub on_flag: Option<String>,
    pub off_flag: Option<String>,
    /// Rendered as a textarea with one value per line
    pub multiline: bool,
}

/// The fields of one command in the chain.
#[derive(Debug, Clone, Serialize)]
pub struct FormLevel {
    pub command_index: usize,
    pub name: String,
    pub path: String,
    /// Command help converted to HTML
    pub help_html: String,
    pub fields: Vec<FormField>,
}

/// Classifies parameters with an ordered handler chain.
pub struct FormGenerator {
    handlers: Vec<Box<dyn InputHandler>>,
}

impl Default for FormGenerator {
    fn default() -> Self {
        Self {
            handlers: vec![
                Box::new(ChoiceInput),
                Box::new(FlagInput),
                Box::new(IntInput),
                Box::new(FloatInput),
                Box::new(FolderInput),
                Box::new(FileInput),
                Box::new(EmailInput),
                Box::new(PasswordInput),
                Box::new(DefaultInput),
            ],
        }
    }
}

impl FormGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a custom handler right before the plain-text fallback.
    pub fn with_handler(mut self, handler: Box<dyn InputHandler>) -> Self {
        let at = self.handlers.len().saturating_sub(1);
        self.handlers.insert(at, handler);
        self
    }

    /// Names of the handlers in the order they are tried.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Describe one parameter. Errors when no handler claims it.
    pub fn field(
        &self,
        param: &ParameterSpec,
        command_index: usize,
        param_index: usize,
    ) -> Result<FormField> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.claims(param))
            .ok_or_else(|| {
                Error::UnsupportedParameter(format!(
                    "no form input for {} '{}' of type {:?}",
                    param.kind, param.name, param.value_kind
                ))
            })?;
        let attrs = handler.type_attrs(param);

        let id = FieldId {
            command_index,
            param_index,
            param_kind: param.kind,
            value_type: attrs.value_type,
            arity: param.arity,
            form_kind: attrs.form_kind,
            cli_name: param.cli_name(),
        };

        let (value, on_flag, off_flag) = match param.kind {
            ParamKind::Flag => (Some(param.cli_name()), Some(param.cli_name()), param.off_literal.clone()),
            ParamKind::Option => (Some(param.default_text().unwrap_or_default()), None, None),
            ParamKind::Argument => (param.default_text(), None, None),
        };

        Ok(FormField {
            name: id.encode(),
            param_kind: param.kind,
            form_kind: attrs.form_kind,
            value_type: attrs.value_type,
            arity: param.arity,
            input_count: param.arity.input_count(),
            required: param.required,
            label: param.label(),
            help: param.help.clone(),
            value,
            checked: param.kind == ParamKind::Flag && param.default_on(),
            choices: attrs.choices,
            step: attrs.step,
            accept: attrs.accept,
            on_flag,
            off_flag,
            multiline: param.kind == ParamKind::Argument && param.arity.is_variadic(),
        })
    }

    /// Describe every parameter of every command in the chain.
    pub fn generate(&self, chain: &CommandChain<'_>) -> Result<Vec<FormLevel>> {
        chain
            .levels()
            .map(|level| {
                let fields = level
                    .node
                    .params()
                    .iter()
                    .enumerate()
                    .map(|(j, param)| self.field(param, level.context.index, j))
                    .collect::<Result<Vec<_>>>()?;
                Ok(FormLevel {
                    command_index: level.context.index,
                    name: level.node.name().to_string(),
                    path: level.context.path_string(),
                    help_html: help_to_html(level.node.help().unwrap_or_default()),
                    fields,
                })
            })
            .collect()
    }
}

/// Convert command help into HTML.
///
/// Text is escaped and lines are joined with `<br>`. A line holding only
/// `\x08` (the `\b` marker) starts a preformatted block, which runs until the
/// next blank line.
pub fn help_to_html(help_text: &str) -> String {
    let mut html = String::new();
    let mut block: Vec<String> = Vec::new();
    let mut in_pre = false;

    for line in help_text.lines() {
        if in_pre && line.trim().is_empty() {
            in_pre = false;
            html.push_str(&block.join("\n"));
            block = vec!["</pre>".to_string()];
            continue;
        } else if line.trim() == "\u{8}" {
            in_pre = true;
            html.push_str(&block.join("<br>\n"));
            block = vec!["<pre>".to_string()];
            continue;
        }
        block.push(escape_html(line));
    }

    if in_pre {
        html.push_str(&block.join("\n"));
        html.push_str("</pre>");
    } else {
        html.push_str(&block.join("<br>\n"));
    }
    html
}

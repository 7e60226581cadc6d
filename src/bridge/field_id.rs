//! Field identifier codec.
//!
//! Every generated form field carries, in its `name` attribute, everything the
//! translator needs to turn the submitted value back into command-line tokens:
//!
//! ```text
//! [command_index].[param_index].[param_kind].[value_type].[arity].[form_kind].[cli_name]
//! ```
//!
//! e.g. `0.0.option.text.1.text.--an-option` or
//! `1.2.argument.file[r].1.file.input`.
//!
//! The first six tokens have a fixed format and never contain the separator.
//! Everything after the sixth separator is the literal CLI name, so a name
//! containing dots survives a round trip without escaping.

use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::bridge::tree::{Arity, ParamKind};

/// Separator between the tokens of an encoded identifier.
pub const SEPARATOR: char = '.';

/// Number of fixed-format tokens before the free-form CLI name.
const FIXED_TOKENS: usize = 6;

/// The type tag a field carries on the wire.
///
/// This is coarser than [`ValueKind`](crate::bridge::tree::ValueKind): it only
/// keeps what the translator and artifact manager need to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Text,
    Int,
    Float,
    Choice,
    BoolFlag,
    Email,
    Password,
    /// File parameter; `writable` distinguishes output files from uploads.
    File { writable: bool },
    /// Directory parameter; `writable` distinguishes output dirs from uploads.
    Path { writable: bool },
}

impl ValueType {
    /// Whether this field resolves to a filesystem artifact.
    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::File { .. } | Self::Path { .. })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Choice => write!(f, "choice"),
            Self::BoolFlag => write!(f, "bool_flag"),
            Self::Email => write!(f, "email"),
            Self::Password => write!(f, "password"),
            Self::File { writable } => write!(f, "file[{}]", mode(*writable)),
            Self::Path { writable } => write!(f, "path[{}]", mode(*writable)),
        }
    }
}

fn mode(writable: bool) -> char {
    if writable { 'w' } else { 'r' }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "choice" => Ok(Self::Choice),
            "bool_flag" => Ok(Self::BoolFlag),
            "email" => Ok(Self::Email),
            "password" => Ok(Self::Password),
            "file[r]" => Ok(Self::File { writable: false }),
            "file[w]" => Ok(Self::File { writable: true }),
            "path[r]" => Ok(Self::Path { writable: false }),
            "path[w]" => Ok(Self::Path { writable: true }),
            _ => Err(Error::MalformedField(format!("unknown value type '{}'", s))),
        }
    }
}

/// The HTML input kind a field is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Text,
    Number,
    Checkbox,
    Select,
    File,
    Hidden,
    Email,
    Password,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Select => "select",
            Self::File => "file",
            Self::Hidden => "hidden",
            Self::Email => "email",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "checkbox" => Ok(Self::Checkbox),
            "select" => Ok(Self::Select),
            "file" => Ok(Self::File),
            "hidden" => Ok(Self::Hidden),
            "email" => Ok(Self::Email),
            "password" => Ok(Self::Password),
            _ => Err(Error::MalformedField(format!("unknown form kind '{}'", s))),
        }
    }
}

/// Identifies one parameter occurrence of one command in a resolved chain.
///
/// Two identifiers are equal exactly when their encodings are equal; every
/// field takes part in the encoding, so the derived equality agrees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId {
    /// Position of the command in the root-to-leaf chain
    pub command_index: usize,
    /// Position of the parameter within the command's parameter list
    pub param_index: usize,
    pub param_kind: ParamKind,
    pub value_type: ValueType,
    pub arity: Arity,
    pub form_kind: FormKind,
    /// The literal command-line name (`--an-option`, `an-argument`)
    pub cli_name: String,
}

impl FieldId {
    /// Encode into the wire representation used as the field name.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a field name. Fails on fewer than six fixed tokens, on an
    /// unparseable fixed token and on an empty CLI name.
    pub fn decode(key: &str) -> Result<Self, Error> {
        key.parse()
    }

    /// Sort key used to place arguments on the command line.
    pub fn order(&self) -> (usize, usize) {
        (self.command_index, self.param_index)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.command_index,
            self.param_index,
            self.param_kind,
            self.value_type,
            self.arity,
            self.form_kind,
            self.cli_name,
            sep = SEPARATOR
        )
    }
}

impl FromStr for FieldId {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = key.splitn(FIXED_TOKENS + 1, SEPARATOR).collect();
        if parts.len() < FIXED_TOKENS {
            return Err(Error::MalformedField(format!(
                "'{}' has {} tokens, expected at least {}",
                key,
                parts.len(),
                FIXED_TOKENS
            )));
        }
        let cli_name = parts.get(FIXED_TOKENS).copied().unwrap_or_default();
        if cli_name.is_empty() {
            return Err(Error::MalformedField(format!(
                "'{}' is missing the command-line name",
                key
            )));
        }

        let index = |token: &str, what: &str| {
            token
                .parse::<usize>()
                .map_err(|_| Error::MalformedField(format!("invalid {} '{}' in '{}'", what, token, key)))
        };

        Ok(Self {
            command_index: index(parts[0], "command index")?,
            param_index: index(parts[1], "parameter index")?,
            param_kind: parts[2].parse()?,
            value_type: parts[3].parse()?,
            arity: parts[4].parse()?,
            form_kind: parts[5].parse()?,
            cli_name: cli_name.to_string(),
        })
    }
}

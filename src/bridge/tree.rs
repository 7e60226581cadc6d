//! Command tree contract and path walker.
//!
//! The bridge never looks inside a particular CLI framework. Anything that can
//! answer the questions in [`CommandSource`] can be served; [`CommandNode`] is
//! the owned implementation built from a config file or by hand.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// How a parameter appears on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Positional argument
    Argument,
    /// `--name value` option
    Option,
    /// Boolean `--on/--off` switch
    Flag,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::Option => "option",
            Self::Flag => "flag",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "argument" => Ok(Self::Argument),
            "option" => Ok(Self::Option),
            "flag" => Ok(Self::Flag),
            _ => Err(Error::MalformedField(format!("unknown parameter kind '{}'", s))),
        }
    }
}

/// Number of values a parameter takes.
///
/// Encoded as `1`, `N` (N >= 2) or `-1` for variadic. Fixed arities are only
/// built through [`Arity::fixed`], so a count of one is always [`Arity::One`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Arity {
    #[default]
    One,
    Fixed(FixedCount),
    Variadic,
}

/// A fixed value count of at least two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedCount(usize);

impl FixedCount {
    pub fn get(self) -> usize {
        self.0
    }
}

impl Arity {
    /// Counts of zero and one both collapse to [`Arity::One`].
    pub fn fixed(n: usize) -> Self {
        if n <= 1 { Self::One } else { Self::Fixed(FixedCount(n)) }
    }

    /// Number of inputs a form shows for this arity.
    pub fn input_count(&self) -> usize {
        match self {
            Self::Fixed(n) => n.get(),
            Self::One | Self::Variadic => 1,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self, Self::Variadic)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "1"),
            Self::Fixed(n) => write!(f, "{}", n.get()),
            Self::Variadic => write!(f, "-1"),
        }
    }
}

impl FromStr for Arity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(-1) => Ok(Self::Variadic),
            Ok(1) => Ok(Self::One),
            Ok(n) if n > 1 => Ok(Self::fixed(n as usize)),
            _ => Err(Error::MalformedField(format!("invalid arity '{}'", s))),
        }
    }
}

/// Declared type of a parameter's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Float,
    Choice(Vec<String>),
    Email,
    Password,
    ReadableFile,
    WritableFile,
    ReadableDir,
    WritableDir,
    /// A type the built-in form handlers do not know. Form generation fails
    /// unless a custom handler claims it.
    Other(String),
}

impl ValueKind {
    /// Parse the name used in config files (`text`, `readable-file`, ...).
    /// Choice lists are attached separately.
    pub fn parse(s: &str) -> Self {
        match s {
            "text" | "string" => Self::Text,
            "integer" | "int" => Self::Integer,
            "float" => Self::Float,
            "choice" => Self::Choice(Vec::new()),
            "email" => Self::Email,
            "password" => Self::Password,
            "readable-file" => Self::ReadableFile,
            "writable-file" => Self::WritableFile,
            "readable-dir" => Self::ReadableDir,
            "writable-dir" => Self::WritableDir,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A parameter's default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    Text(String),
    Flag(bool),
}

/// One parameter of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub arity: Arity,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub value_kind: ValueKind,
    pub help: Option<String>,
    /// Explicit command-line literal for options and the "on" literal of
    /// flags. Defaults to `--<name>` with underscores as dashes.
    pub literal: Option<String>,
    /// The "off" literal of a flag (`--no-verbose`).
    pub off_literal: Option<String>,
}

impl ParameterSpec {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arity: Arity::One,
            required: kind == ParamKind::Argument,
            default: None,
            value_kind: ValueKind::Text,
            help: None,
            literal: None,
            off_literal: None,
        }
    }

    /// A positional argument; required unless changed.
    pub fn argument(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Argument)
    }

    /// A value-carrying option.
    pub fn option(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Option)
    }

    /// A boolean flag with its on literal and optional off literal.
    pub fn flag(name: impl Into<String>, on: impl Into<String>, off: Option<&str>) -> Self {
        let mut spec = Self::new(name, ParamKind::Flag);
        spec.literal = Some(on.into());
        spec.off_literal = off.map(str::to_string);
        spec.default = Some(DefaultValue::Flag(false));
        spec
    }

    pub fn with_value_kind(mut self, value_kind: ValueKind) -> Self {
        self.value_kind = value_kind;
        self
    }

    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        if arity.is_variadic() && self.kind == ParamKind::Argument {
            self.required = false;
        }
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_literal(mut self, literal: impl Into<String>) -> Self {
        self.literal = Some(literal.into());
        self
    }

    /// The token placed on the command line for this parameter: the literal
    /// for options and flags, the dashed name for arguments.
    pub fn cli_name(&self) -> String {
        let dashed = self.name.replace('_', "-");
        match self.kind {
            ParamKind::Argument => dashed,
            ParamKind::Option | ParamKind::Flag => self
                .literal
                .clone()
                .unwrap_or_else(|| format!("--{}", dashed)),
        }
    }

    /// Human readable label.
    pub fn label(&self) -> String {
        let spaced = self.name.trim_start_matches('-').replace(['_', '-'], " ");
        match self.kind {
            ParamKind::Argument => spaced.to_uppercase(),
            ParamKind::Option | ParamKind::Flag => spaced,
        }
    }

    /// Whether a flag is on by default.
    pub fn default_on(&self) -> bool {
        matches!(self.default, Some(DefaultValue::Flag(true)))
    }

    /// Default rendered as text, if any.
    pub fn default_text(&self) -> Option<String> {
        match &self.default {
            Some(DefaultValue::Text(s)) => Some(s.clone()),
            Some(DefaultValue::Flag(_)) | None => None,
        }
    }
}

/// What the bridge needs from an embedded command tree.
pub trait CommandSource: Send + Sync {
    fn name(&self) -> &str;

    fn help(&self) -> Option<&str>;

    /// Parameters in declaration order.
    fn params(&self) -> &[ParameterSpec];

    fn is_group(&self) -> bool;

    /// Direct child by name; always `None` for plain commands.
    fn child(&self, name: &str) -> Option<&dyn CommandSource>;

    /// Names of the direct children.
    fn child_names(&self) -> Vec<String>;
}

/// Owned command tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub name: String,
    pub help: Option<String>,
    pub params: Vec<ParameterSpec>,
    pub is_group: bool,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    /// A leaf command.
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: None,
            params: Vec::new(),
            is_group: false,
            children: Vec::new(),
        }
    }

    /// A group that holds subcommands.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            is_group: true,
            ..Self::command(name)
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_param(mut self, param: ParameterSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Adds a subcommand, turning this node into a group.
    pub fn with_child(mut self, child: CommandNode) -> Self {
        self.is_group = true;
        self.children.push(child);
        self
    }
}

impl CommandSource for CommandNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    fn params(&self) -> &[ParameterSpec] {
        &self.params
    }

    fn is_group(&self) -> bool {
        self.is_group
    }

    fn child(&self, name: &str) -> Option<&dyn CommandSource> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| c as &dyn CommandSource)
    }

    fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|c| c.name.clone()).collect()
    }
}

/// Per-level state accumulated while walking down the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Position in the chain; this is the `command_index` of its fields
    pub index: usize,
    /// Names from the root down to and including this level
    pub path: Vec<String>,
}

impl CommandContext {
    /// Name of the parent command, if any.
    pub fn parent(&self) -> Option<&str> {
        let n = self.path.len();
        if n >= 2 {
            Some(self.path[n - 2].as_str())
        } else {
            None
        }
    }

    /// Slash-joined path of this level.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

/// One level of a resolved command path.
#[derive(Clone, Copy)]
pub struct Resolved<'a> {
    pub context: &'a CommandContext,
    pub node: &'a dyn CommandSource,
}

/// The resolved root-to-leaf chain for a path.
pub struct CommandChain<'a> {
    contexts: Vec<CommandContext>,
    nodes: Vec<&'a dyn CommandSource>,
}

impl<'a> CommandChain<'a> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn levels(&self) -> impl Iterator<Item = Resolved<'_>> {
        self.contexts
            .iter()
            .zip(self.nodes.iter())
            .map(|(context, node)| Resolved {
                context,
                node: *node,
            })
    }

    /// The leaf command.
    pub fn leaf(&self) -> Option<&'a dyn CommandSource> {
        self.nodes.last().copied()
    }

    /// Names of every level, root first.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Full slash-joined path.
    pub fn path_string(&self) -> String {
        self.names().join("/")
    }
}

/// Resolve a slash-separated path, descending exactly one level per segment.
pub fn resolve_path<'a>(root: &'a dyn CommandSource, path: &str) -> Result<CommandChain<'a>, Error> {
    let mut segments = path.split('/');
    let root_name = segments.next().unwrap_or_default();
    if root_name != root.name() {
        return Err(Error::CommandNotFound(format!(
            "Failed to find root command '{}'. There is a root command named: {}",
            root_name,
            root.name()
        )));
    }

    let mut contexts = vec![CommandContext {
        index: 0,
        path: vec![root.name().to_string()],
    }];
    let mut nodes = vec![root];
    let mut current = root;

    for segment in segments {
        let next = current.child(segment).ok_or_else(|| {
            Error::CommandNotFound(format!(
                "Failed to find command for path \"{}\". Command \"{}\" not found. Must be one of {:?}",
                path,
                segment,
                current.child_names()
            ))
        })?;
        let parent = contexts.last().map(|c| c.path.clone()).unwrap_or_default();
        let mut child_path = parent;
        child_path.push(next.name().to_string());
        contexts.push(CommandContext {
            index: contexts.len(),
            path: child_path,
        });
        nodes.push(next);
        current = next;
    }

    Ok(CommandChain { contexts, nodes })
}

//! Command tree declarations in config.kdl.
//!
//! ```kdl
//! command "archivy" help="Knowledge base" {
//!     flag "debug"
//!     command "add" help="Add a bookmark" {
//!         argument "url"
//!         option "tag" arity=-1 help="Tags"
//!         flag "verbose" on="--verbose" off="--no-verbose" default=#true
//!         option "mode" type="choice" { choice "a"; choice "b"; }
//!     }
//! }
//! ```
//!
//! A `command` holding other `command` nodes is a group; `group=#true` marks an
//! empty one. Parameters keep their declaration order.

use kdl::{KdlDocument, KdlNode};

use crate::bridge::tree::{Arity, CommandNode, DefaultValue, ParameterSpec, ValueKind};
use crate::config::schema::{get_property, get_string_arg, get_string_args, value_text};
use crate::{Error, Result};

/// Parse the single root `command` node of a document.
pub fn parse_command_tree(doc: &KdlDocument) -> Result<CommandNode> {
    let mut roots = doc.nodes().iter().filter(|n| n.name().value() == "command");
    let root = roots
        .next()
        .ok_or_else(|| Error::InvalidConfig("no `command` node declared".to_string()))?;
    if roots.next().is_some() {
        return Err(Error::InvalidConfig(
            "only one root `command` node may be declared".to_string(),
        ));
    }
    parse_command_node(root)
}

fn parse_command_node(node: &KdlNode) -> Result<CommandNode> {
    let name = get_string_arg(node)
        .ok_or_else(|| Error::InvalidConfig("command node must have a name argument".to_string()))?;

    let mut command = CommandNode::command(&name);
    if get_property(node, "group").and_then(|v| v.as_bool()) == Some(true) {
        command.is_group = true;
    }
    if let Some(help) = get_property(node, "help").and_then(|v| v.as_string()) {
        command = command.with_help(help);
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            command = match child.name().value() {
                "command" => command.with_child(parse_command_node(child)?),
                "argument" | "option" | "flag" => command.with_param(parse_param_node(child)?),
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "unknown node '{}' in command '{}'",
                        other, name
                    )));
                }
            };
        }
    }

    Ok(command)
}

fn parse_param_node(node: &KdlNode) -> Result<ParameterSpec> {
    let kind = node.name().value();
    let name = get_string_arg(node)
        .ok_or_else(|| Error::InvalidConfig(format!("{} node must have a name argument", kind)))?;

    let mut spec = match kind {
        "flag" => {
            let on = get_property(node, "on")
                .and_then(|v| v.as_string())
                .map(str::to_string)
                .unwrap_or_else(|| format!("--{}", name.replace('_', "-")));
            let off = get_property(node, "off").and_then(|v| v.as_string());
            let mut spec = ParameterSpec::flag(&name, on, off);
            if let Some(on_by_default) = get_property(node, "default").and_then(|v| v.as_bool()) {
                spec = spec.with_default(DefaultValue::Flag(on_by_default));
            }
            spec
        }
        "argument" => ParameterSpec::argument(&name),
        _ => ParameterSpec::option(&name),
    };

    if kind != "flag" {
        if let Some(type_name) = get_property(node, "type").and_then(|v| v.as_string()) {
            let value_kind = match ValueKind::parse(type_name) {
                ValueKind::Choice(_) => ValueKind::Choice(parse_choices(node)),
                other => other,
            };
            spec = spec.with_value_kind(value_kind);
        }
        if let Some(literal) = get_property(node, "literal").and_then(|v| v.as_string()) {
            spec = spec.with_literal(literal);
        }
        if let Some(arity) = get_property(node, "arity") {
            spec = spec.with_arity(parse_arity(&name, arity.as_integer())?);
        }
        if let Some(default) = get_property(node, "default").and_then(value_text) {
            spec = spec.with_default(DefaultValue::Text(default));
        }
    }

    if let Some(required) = get_property(node, "required").and_then(|v| v.as_bool()) {
        spec = spec.with_required(required);
    }
    if let Some(help) = get_property(node, "help").and_then(|v| v.as_string()) {
        spec = spec.with_help(help);
    }

    Ok(spec)
}

fn parse_arity(name: &str, value: Option<i128>) -> Result<Arity> {
    match value {
        Some(-1) => Ok(Arity::Variadic),
        Some(n) if n >= 1 => Ok(Arity::fixed(n as usize)),
        _ => Err(Error::InvalidConfig(format!(
            "arity of '{}' must be -1 or a positive integer",
            name
        ))),
    }
}

fn parse_choices(node: &KdlNode) -> Vec<String> {
    node.children()
        .map(|children| {
            children
                .nodes()
                .iter()
                .filter(|c| c.name().value() == "choice")
                .flat_map(get_string_args)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tree::{CommandSource, ParamKind};

    fn parse(kdl: &str) -> Result<CommandNode> {
        let doc: KdlDocument = kdl.parse().unwrap();
        parse_command_tree(&doc)
    }

    #[test]
    fn test_parse_nested_tree() {
        let root = parse(
            r#"
            command "tool" help="The tool" {
                flag "debug"
                command "echo" {
                    argument "msg"
                }
                command "db" {
                    command "migrate"
                }
            }
            "#,
        )
        .unwrap();

        assert_eq!(root.name, "tool");
        assert!(root.is_group);
        assert_eq!(root.help(), Some("The tool"));
        assert_eq!(root.child_names(), vec!["echo", "db"]);
        assert_eq!(root.params[0].cli_name(), "--debug");
        assert!(!root.child("echo").unwrap().is_group());
        assert!(root.child("db").unwrap().is_group());
    }

    #[test]
    fn test_parse_parameters() {
        let root = parse(
            r#"
            command "add" {
                argument "url" help="Where"
                argument "files" arity=-1
                option "tag" literal="-t" arity=2 required=#true
                option "count" type="integer" default=1
                option "out" type="writable-dir"
                option "mode" type="choice" { choice "a"; choice "b" "c"; }
                flag "verbose" on="--verbose" off="--no-verbose" default=#true
            }
            "#,
        )
        .unwrap();
        let p = &root.params;

        assert_eq!(p[0].kind, ParamKind::Argument);
        assert!(p[0].required);
        assert_eq!(p[0].help.as_deref(), Some("Where"));

        assert_eq!(p[1].arity, Arity::Variadic);
        assert!(!p[1].required);

        assert_eq!(p[2].cli_name(), "-t");
        assert_eq!(p[2].arity, Arity::fixed(2));
        assert!(p[2].required);

        assert_eq!(p[3].value_kind, ValueKind::Integer);
        assert_eq!(p[3].default_text().as_deref(), Some("1"));

        assert_eq!(p[4].value_kind, ValueKind::WritableDir);
        assert_eq!(
            p[5].value_kind,
            ValueKind::Choice(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );

        assert_eq!(p[6].kind, ParamKind::Flag);
        assert_eq!(p[6].cli_name(), "--verbose");
        assert_eq!(p[6].off_literal.as_deref(), Some("--no-verbose"));
        assert!(p[6].default_on());
    }

    #[test]
    fn test_empty_group() {
        let root = parse(r#"command "tool" group=#true"#).unwrap();
        assert!(root.is_group);
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_missing_root() {
        assert!(matches!(parse("port 5000"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_two_roots_rejected() {
        assert!(parse("command \"a\"\ncommand \"b\"").is_err());
    }

    #[test]
    fn test_invalid_arity_rejected() {
        assert!(parse(r#"command "a" { option "x" arity=0; }"#).is_err());
    }

    #[test]
    fn test_unknown_child_rejected() {
        let err = parse(r#"command "a" { parameter "x"; }"#).unwrap_err();
        assert!(err.to_string().contains("parameter"));
    }

    #[test]
    fn test_unknown_type_is_kept_for_custom_handlers() {
        let root = parse(r#"command "a" { option "when" type="date"; }"#).unwrap();
        assert_eq!(root.params[0].value_kind, ValueKind::Other("date".to_string()));
    }
}

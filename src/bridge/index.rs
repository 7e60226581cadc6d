//! The browsable command index.

use serde::Serialize;

use crate::bridge::tree::CommandSource;

/// URL prefix of the form and execute endpoints.
pub const CLI_MOUNT: &str = "/cli";

/// One node of the index tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub name: String,
    pub short_help: String,
    pub help: Option<String>,
    /// URL of the command's form
    pub path: String,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IndexEntry>,
}

/// Build the index for `root`, leaving out every command named in `hidden`.
///
/// Within a group plain commands come before subgroups, each sorted by name.
pub fn command_index(root: &dyn CommandSource, hidden: &[String]) -> IndexEntry {
    entry(root, CLI_MOUNT.to_string(), hidden)
}

fn entry(node: &dyn CommandSource, path: String, hidden: &[String]) -> IndexEntry {
    let mut children: Vec<&dyn CommandSource> = node
        .child_names()
        .iter()
        .filter(|name| !hidden.contains(name))
        .filter_map(|name| node.child(name))
        .collect();
    children.sort_by(|a, b| (a.is_group(), a.name()).cmp(&(b.is_group(), b.name())));

    let children = children
        .into_iter()
        .map(|child| entry(child, format!("{}/{}", path, child.name()), hidden))
        .collect();

    IndexEntry {
        name: node.name().to_string(),
        short_help: short_help(node.help().unwrap_or_default()),
        help: node.help().map(str::to_string),
        path,
        is_group: node.is_group(),
        children,
    }
}

/// First line of the help, cut at a preformatted block marker.
pub fn short_help(help: &str) -> String {
    help.split('\u{8}')
        .next()
        .and_then(|s| s.lines().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tree::CommandNode;

    fn tree() -> CommandNode {
        CommandNode::group("tool")
            .with_help("The tool\n\nLonger text")
            .with_child(CommandNode::group("db").with_child(CommandNode::command("migrate")))
            .with_child(CommandNode::command("shell"))
            .with_child(CommandNode::command("zap").with_help("Zap it"))
            .with_child(CommandNode::command("add"))
    }

    #[test]
    fn test_commands_before_groups_then_by_name() {
        let index = command_index(&tree(), &[]);
        let names: Vec<_> = index.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["add", "shell", "zap", "db"]);
    }

    #[test]
    fn test_hidden_commands_are_skipped() {
        let index = command_index(&tree(), &["shell".to_string()]);
        assert!(index.children.iter().all(|c| c.name != "shell"));
    }

    #[test]
    fn test_paths_and_help() {
        let index = command_index(&tree(), &[]);
        assert_eq!(index.path, "/cli");
        assert_eq!(index.short_help, "The tool");
        assert!(index.is_group);

        let db = index.children.iter().find(|c| c.name == "db").unwrap();
        assert_eq!(db.children[0].path, "/cli/db/migrate");
        assert!(!db.children[0].is_group);

        let zap = index.children.iter().find(|c| c.name == "zap").unwrap();
        assert_eq!(zap.short_help, "Zap it");
    }

    #[test]
    fn test_short_help_stops_at_block_marker() {
        assert_eq!(short_help("\u{8}\nexample"), "");
        assert_eq!(short_help("Summary line\u{8}\ncode"), "Summary line");
        assert_eq!(short_help(""), "");
    }

    #[test]
    fn test_leaf_entry_omits_children_in_json() {
        let json = serde_json::to_value(command_index(&CommandNode::command("solo"), &[])).unwrap();
        assert!(json.get("children").is_none());
        assert_eq!(json["path"], "/cli");
    }
}

//! The command-line to web bridge.
//!
//! - [`field_id`]: the wire encoding of form field names
//! - [`tree`]: the command tree contract and path walker
//! - [`form`]: form schema generation
//! - [`request`]: submitted form to argv translation
//! - [`artifacts`]: temp files and directories for path-typed parameters
//! - [`runner`]: subprocess execution and output streaming
//! - [`index`]: the browsable command index

pub mod artifacts;
pub mod field_id;
pub mod form;
pub mod index;
pub mod request;
pub mod runner;
pub mod tree;

pub use artifacts::{RESULTS_MOUNT, RequestWorkspace, Upload};
pub use field_id::{FieldId, FormKind, ValueType};
pub use form::{FormField, FormGenerator, FormLevel, InputHandler, TypeAttrs};
pub use index::{CLI_MOUNT, IndexEntry, command_index};
pub use request::{Download, FieldInfo, RequestToArgs, SubmittedForm};
pub use runner::{Framing, execute};
pub use tree::{
    Arity, CommandChain, CommandContext, CommandNode, CommandSource, DefaultValue, ParamKind,
    ParameterSpec, ValueKind, resolve_path,
};

/// Escape text for use in HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }
}

//! Rich-text flattening and repository link mining.
//!
//! Jira returns formatted fields (description, comments) as Atlassian
//! Document Format trees. [`extract_text`] flattens them into plain text with
//! light markdown-ish markers for lists, code and quotes;
//! [`repo_urls::mine_repository_urls`] pulls repository links out of the
//! result.

pub mod node;
pub mod repo_urls;

use serde_json::Value;

pub use node::RichTextNode;
pub use repo_urls::mine_repository_urls;

/// Flatten a field value into plain text.
///
/// Strings are returned unchanged, `null` yields an empty string, and a
/// document tree (`type: "doc"`) is walked recursively. Any other shape
/// contributes nothing.
#[must_use]
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        _ if RichTextNode::is_document(value) => render(&RichTextNode::from_value(value)),
        _ => String::new(),
    }
}

/// Render a typed node to plain text.
#[must_use]
pub fn render(node: &RichTextNode) -> String {
    render_children(std::slice::from_ref(node))
}

/// Render one `content` array. Block separators only look at text
/// accumulated at this level, never at the caller's.
fn render_children(nodes: &[RichTextNode]) -> String {
    let mut text = String::new();

    for node in nodes {
        match node {
            RichTextNode::Text(literal) => text.push_str(literal),
            RichTextNode::HardBreak => text.push('\n'),
            RichTextNode::Paragraph(children) | RichTextNode::Heading(children) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&render_children(children));
                text.push('\n');
            }
            RichTextNode::Doc(children)
            | RichTextNode::BulletList(children)
            | RichTextNode::OrderedList(children) => {
                text.push_str(&render_children(children));
            }
            RichTextNode::ListItem(children) => {
                text.push_str("- ");
                text.push_str(render_children(children).trim_end());
                text.push('\n');
            }
            RichTextNode::CodeBlock(children) => {
                text.push_str("```\n");
                text.push_str(&render_children(children));
                text.push_str("```\n");
            }
            RichTextNode::Blockquote(children) => {
                let quoted = render_children(children)
                    .split('\n')
                    .map(|line| format!("> {line}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                text.push_str(&quoted);
                text.push('\n');
            }
            RichTextNode::InlineCard { url } | RichTextNode::BlockCard { url } => {
                text.push_str(url.as_deref().unwrap_or_default());
            }
            RichTextNode::Other {
                content: Some(children),
            } => text.push_str(&render_children(children)),
            RichTextNode::Other { content: None } => {}
        }
    }

    text
}

//! Typed view of Atlassian Document Format trees.

use serde_json::Value;

/// A single document node.
///
/// Known kinds carry exactly the data the extractor needs. Anything else
/// lands in [`RichTextNode::Other`], which keeps its children (if any) so
/// that new container kinds still contribute their text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RichTextNode {
    /// Document root.
    Doc(Vec<RichTextNode>),
    /// Run of text.
    Text(String),
    /// Line break inside a block.
    HardBreak,
    /// Paragraph.
    Paragraph(Vec<RichTextNode>),
    /// Heading of any level.
    Heading(Vec<RichTextNode>),
    /// Unordered list.
    BulletList(Vec<RichTextNode>),
    /// Numbered list.
    OrderedList(Vec<RichTextNode>),
    /// Item of either list kind.
    ListItem(Vec<RichTextNode>),
    /// Preformatted code.
    CodeBlock(Vec<RichTextNode>),
    /// Quoted block.
    Blockquote(Vec<RichTextNode>),
    /// Inline smart link.
    InlineCard {
        /// Link target.
        url: Option<String>,
    },
    /// Block-level smart link.
    BlockCard {
        /// Link target.
        url: Option<String>,
    },
    /// Any kind not listed above.
    Other {
        /// Children, when the node had a `content` array.
        content: Option<Vec<RichTextNode>>,
    },
}

impl RichTextNode {
    /// Convert a JSON value into a node.
    ///
    /// Total: non-objects and objects without a string `type` become
    /// [`RichTextNode::Other`] with no children.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Other { content: None };
        };
        let kind = object.get("type").and_then(Value::as_str).unwrap_or_default();
        let children = || children_of(value).unwrap_or_default();

        match kind {
            "doc" => Self::Doc(children()),
            "text" => Self::Text(
                object
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            ),
            "hardBreak" => Self::HardBreak,
            "paragraph" => Self::Paragraph(children()),
            "heading" => Self::Heading(children()),
            "bulletList" => Self::BulletList(children()),
            "orderedList" => Self::OrderedList(children()),
            "listItem" => Self::ListItem(children()),
            "codeBlock" => Self::CodeBlock(children()),
            "blockquote" => Self::Blockquote(children()),
            "inlineCard" => Self::InlineCard { url: card_url(value) },
            "blockCard" => Self::BlockCard { url: card_url(value) },
            _ => Self::Other {
                content: children_of(value),
            },
        }
    }

    /// Whether `value` looks like a document root (`type: "doc"` with a
    /// `content` array).
    #[must_use]
    pub fn is_document(value: &Value) -> bool {
        value.get("type").and_then(Value::as_str) == Some("doc")
            && value.get("content").is_some_and(Value::is_array)
    }
}

fn children_of(value: &Value) -> Option<Vec<RichTextNode>> {
    value
        .get("content")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(RichTextNode::from_value).collect())
}

fn card_url(value: &Value) -> Option<String> {
    value
        .get("attrs")
        .and_then(|attrs| attrs.get("url"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

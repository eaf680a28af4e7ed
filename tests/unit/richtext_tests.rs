//! Flattening Atlassian Document Format trees to text.

use serde_json::{json, Value};

use jira_automation::richtext::{extract_text, RichTextNode};

fn text(value: &str) -> Value {
    json!({ "type": "text", "text": value })
}

fn paragraph(content: Vec<Value>) -> Value {
    json!({ "type": "paragraph", "content": content })
}

fn doc(content: Vec<Value>) -> Value {
    json!({ "type": "doc", "version": 1, "content": content })
}

#[test]
fn paragraphs_end_with_newline() {
    let value = doc(vec![
        paragraph(vec![text("A")]),
        paragraph(vec![text("B")]),
    ]);
    assert_eq!(extract_text(&value), "A\nB\n");
}

#[test]
fn heading_then_paragraph() {
    let value = doc(vec![
        json!({ "type": "heading", "attrs": { "level": 2 }, "content": [text("Title")] }),
        paragraph(vec![text("Body")]),
    ]);
    assert_eq!(extract_text(&value), "Title\nBody\n");
}

#[test]
fn paragraph_after_inline_text_gets_separator() {
    let value = doc(vec![text("lead"), paragraph(vec![text("next")])]);
    assert_eq!(extract_text(&value), "lead\nnext\n");
}

#[test]
fn hard_break_is_newline() {
    let value = doc(vec![paragraph(vec![
        text("one"),
        json!({ "type": "hardBreak" }),
        text("two"),
    ])]);
    assert_eq!(extract_text(&value), "one\ntwo\n");
}

#[test]
fn bullet_list_items_are_dashed() {
    let item = |label: &str| json!({ "type": "listItem", "content": [paragraph(vec![text(label)])] });
    let value = doc(vec![json!({
        "type": "bulletList",
        "content": [item("first"), item("second")]
    })]);
    assert_eq!(extract_text(&value), "- first\n- second\n");
}

#[test]
fn ordered_list_uses_same_marker() {
    let value = doc(vec![json!({
        "type": "orderedList",
        "content": [{ "type": "listItem", "content": [paragraph(vec![text("step")])] }]
    })]);
    assert_eq!(extract_text(&value), "- step\n");
}

#[test]
fn code_block_is_fenced() {
    let value = doc(vec![json!({
        "type": "codeBlock",
        "attrs": { "language": "rust" },
        "content": [text("let x = 1;\n")]
    })]);
    assert_eq!(extract_text(&value), "```\nlet x = 1;\n```\n");
}

#[test]
fn blockquote_prefixes_each_line() {
    let value = doc(vec![json!({
        "type": "blockquote",
        "content": [paragraph(vec![text("quoted")])]
    })]);
    assert_eq!(extract_text(&value), "> quoted\n> \n");
}

#[test]
fn cards_render_their_url() {
    let value = doc(vec![paragraph(vec![
        text("repo: "),
        json!({ "type": "inlineCard", "attrs": { "url": "https://github.com/org/repo" } }),
    ])]);
    assert_eq!(extract_text(&value), "repo: https://github.com/org/repo\n");
}

#[test]
fn card_without_url_is_empty() {
    let value = doc(vec![json!({ "type": "blockCard", "attrs": {} })]);
    assert_eq!(extract_text(&value), "");
}

#[test]
fn unknown_container_passes_children_through() {
    let value = doc(vec![json!({
        "type": "panel",
        "attrs": { "panelType": "info" },
        "content": [paragraph(vec![text("inside")])]
    })]);
    assert_eq!(extract_text(&value), "inside\n");
}

#[test]
fn unknown_leaf_contributes_nothing() {
    let value = doc(vec![
        json!({ "type": "emoji", "attrs": { "shortName": ":smile:" } }),
        paragraph(vec![text("after")]),
    ]);
    assert_eq!(extract_text(&value), "after\n");
}

#[test]
fn strings_are_identity() {
    for s in ["", "plain", "multi\nline", "  padded "] {
        assert_eq!(extract_text(&json!(s)), s);
    }
}

#[test]
fn malformed_shapes_never_panic() {
    let shapes = [
        json!(null),
        json!(7),
        json!([1, 2]),
        json!({ "type": "doc" }),
        json!({ "type": "doc", "content": "nope" }),
        json!({ "type": "doc", "content": [1, "x", null, { "content": 3 }] }),
        json!({ "type": "doc", "content": [{ "type": "text" }] }),
        json!({ "type": "doc", "content": [{ "type": 5, "content": [] }] }),
    ];
    for shape in &shapes {
        let _ = extract_text(shape);
    }
    assert_eq!(extract_text(&shapes[5]), "");
}

#[test]
fn node_conversion_is_total() {
    assert_eq!(
        RichTextNode::from_value(&json!("text")),
        RichTextNode::Other { content: None }
    );
    assert_eq!(
        RichTextNode::from_value(&json!({ "type": "hardBreak" })),
        RichTextNode::HardBreak
    );
    assert!(RichTextNode::is_document(&doc(vec![])));
    assert!(!RichTextNode::is_document(&json!({ "type": "doc" })));
}

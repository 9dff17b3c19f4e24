use crate::error::ParseError;
use crate::timestamp;
use roxmltree::{Document, Node, ParsingOptions};
use time::OffsetDateTime;

pub(crate) fn parse_document(text: &str) -> Result<Document<'_>, ParseError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Ok(Document::parse_with_options(text, options)?)
}

/// First element with this name anywhere in the document.
pub(crate) fn first<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Option<Node<'a, 'input>> {
    doc.descendants().find(|node| node.has_tag_name(name))
}

pub(crate) fn elements<'a, 'input>(
    doc: &'a Document<'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    doc.descendants().filter(move |node| node.has_tag_name(name))
}

/// Element children of every `<actions>` element, in document order.
pub(crate) fn action_children<'a, 'input>(
    doc: &'a Document<'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    elements(doc, "actions").flat_map(|actions| actions.children().filter(Node::is_element))
}

/// Concatenated text of the node and all of its descendants.
pub(crate) fn inner_text(node: Node) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|text| text.text())
        .collect()
}

/// Text of the nested `<text>` children of an action.
pub(crate) fn nested_text(node: Node) -> String {
    node.children()
        .filter(|child| child.has_tag_name("text"))
        .map(inner_text)
        .collect()
}

pub(crate) fn datetime(node: Node) -> Result<OffsetDateTime, ParseError> {
    let raw = node
        .attribute("datetime")
        .ok_or_else(|| ParseError::MissingDatetime {
            element: node.tag_name().name().to_string(),
        })?;
    timestamp::parse(raw)
}

pub(crate) fn attribute(node: Node, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

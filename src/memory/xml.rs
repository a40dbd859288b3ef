use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, Event},
};

use super::{Element, TreeState};
use crate::TreeError;

fn parse_error(e: impl std::fmt::Display) -> TreeError {
    TreeError::Parse(e.to_string())
}

fn open(
    nodes: &mut Vec<Option<Element>>,
    stack: &[usize],
    root: &mut Option<usize>,
    start: &BytesStart<'_>,
) -> Result<usize, TreeError> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        parent: stack.last().copied(),
        ..Element::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(parse_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(parse_error)?.into_owned();
        element.attributes.push((key, value));
    }
    let index = nodes.len();
    match stack.last() {
        Some(parent) => {
            if let Some(parent) = nodes[*parent].as_mut() {
                parent.children.push(index);
            }
        }
        None if root.is_some() => {
            return Err(TreeError::Parse("multiple root elements".to_owned()));
        }
        None => *root = Some(index),
    }
    nodes.push(Some(element));
    Ok(index)
}

fn append_text(nodes: &mut [Option<Element>], stack: &[usize], text: &str) {
    if text.is_empty() {
        return;
    }
    let Some(element) = stack.last().and_then(|top| nodes[*top].as_mut()) else {
        return;
    };
    match &mut element.text {
        Some(existing) => existing.push_str(text),
        None => element.text = Some(text.to_owned()),
    }
}

/// Parses a document into arena nodes and the root index.
pub(super) fn parse(text: &str) -> Result<(Vec<Option<Element>>, Option<usize>), TreeError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut nodes = Vec::new();
    let mut stack = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(start) => {
                let index = open(&mut nodes, &stack, &mut root, &start)?;
                stack.push(index);
            }
            Event::Empty(start) => {
                open(&mut nodes, &stack, &mut root, &start)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(parse_error)?;
                append_text(&mut nodes, &stack, &text);
            }
            Event::CData(data) => {
                let data = data.into_inner();
                append_text(&mut nodes, &stack, &String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(TreeError::Parse("unclosed element at end of input".to_owned()));
    }
    Ok((nodes, root))
}

/// Renders the tree as compact XML.
pub(super) fn render(state: &TreeState) -> String {
    let mut out = String::new();
    if let Some(root) = state.root {
        render_element(state, root, &mut out);
    }
    out
}

fn render_element(state: &TreeState, index: usize, out: &mut String) {
    let Some(element) = state.nodes.get(index).and_then(Option::as_ref) else {
        return;
    };
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() && element.text.is_none() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if let Some(text) = &element.text {
        out.push_str(&escape(text.as_str()));
    }
    for child in &element.children {
        render_element(state, *child, out);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

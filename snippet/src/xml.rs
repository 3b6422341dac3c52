//! Owned XML element tree.
//!
//! MusicXML carries far more than the trimmer looks at (pitches, beams, lyrics, layout). Every
//! element is kept as an [`XmlElement`] so that a score written back out loses nothing that was
//! not deliberately removed.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `<name>text</name>`
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(XmlNode::Text(text.into()));
        element
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Concatenated text content of this element, trimmed.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect::<String>()
            .trim()
            .to_string()
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(XmlElement::text)
    }

    /// Copies a parsed node and its descendants. Whitespace-only text is dropped; the writer
    /// re-indents on output.
    pub(crate) fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let tag = node.tag_name();
        let mut element = Self::new(qualified(node, tag.namespace(), tag.name()));
        element.attributes = attributes_of(node);

        for child in node.children() {
            if child.is_element() {
                element.push(Self::from_node(child));
            } else if child.is_text() {
                if let Some(text) = child.text().filter(|text| !text.trim().is_empty()) {
                    element.children.push(XmlNode::Text(text.to_string()));
                }
            }
        }

        element
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write(writer)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// `prefix:local` for names bound to a prefixed namespace, `local` otherwise.
fn qualified(node: roxmltree::Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    let prefix = namespace.and_then(|uri| {
        if uri == XML_NAMESPACE {
            Some("xml")
        } else {
            node.lookup_prefix(uri)
        }
    });
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

/// Attributes of `node` with their prefixes, preceded by the namespace declarations it
/// introduces.
pub(crate) fn attributes_of(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|parent| parent.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();

    let declarations = node
        .namespaces()
        .filter(|ns| ns.name() != Some("xml") && !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| {
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            (key, ns.uri().to_string())
        });

    let attributes = node.attributes().map(|attr| {
        (
            qualified(node, attr.namespace(), attr.name()),
            attr.value().to_string(),
        )
    });

    declarations.chain(attributes).collect()
}

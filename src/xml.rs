//! XML tree – an owned, editable element tree for package parts.
//!
//! The tree keeps every node it does not understand (declarations, comments,
//! processing instructions) as raw events so that a parse → edit → write
//! cycle changes nothing but the edited nodes. Element and attribute names
//! are kept as qualified names (`w:p`, `r:embed`).

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ForgeError, Result};

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    /// Unescaped character data.
    Text(String),
    /// Anything else, written back verbatim.
    Raw(Event<'static>),
}

/// An element carrying its qualified name, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order with unescaped values.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Eq for XmlNode {}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(XmlNode::Text(text.to_string()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Direct child elements named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }
}

/// A parsed XML part: the root element plus whatever surrounds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// The first top-level element.
    pub fn root(&self) -> Option<&XmlElement> {
        self.nodes.iter().find_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut XmlElement> {
        self.nodes.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a UTF-8 XML part into a tree.
pub fn parse(xml: &str) -> Result<XmlDocument> {
    let mut reader = Reader::from_str(xml);
    // Parents of the element currently being filled.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut top: Vec<XmlNode> = Vec::new();

    loop {
        let node = match reader.read_event()? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
                continue;
            }
            Event::End(_) => match stack.pop() {
                Some(done) => XmlNode::Element(done),
                None => {
                    return Err(ForgeError::Package(format!(
                        "unbalanced closing tag at byte {}",
                        reader.buffer_position()
                    )))
                }
            },
            Event::Empty(start) => XmlNode::Element(element_from_start(&start)?),
            Event::Text(text) => XmlNode::Text(text.unescape()?.into_owned()),
            Event::CData(data) => XmlNode::Raw(Event::CData(data.into_owned())),
            Event::Eof => break,
            other => XmlNode::Raw(other.into_owned()),
        };

        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => top.push(node),
        }
    }

    if let Some(open) = stack.last() {
        return Err(ForgeError::Package(format!(
            "element <{}> is never closed",
            open.name
        )));
    }
    Ok(XmlDocument { nodes: top })
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(&name);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialise a tree back to bytes.
pub fn write(doc: &XmlDocument) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    for node in &doc.nodes {
        write_node(&mut writer, node)?;
    }
    Ok(writer.into_inner())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    match node {
        XmlNode::Element(element) => {
            let mut start = BytesStart::new(element.name.as_str());
            for (key, value) in &element.attributes {
                start.push_attribute((key.as_str(), value.as_str()));
            }
            if element.children.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                let end = start.to_end().into_owned();
                writer.write_event(Event::Start(start))?;
                for child in &element.children {
                    write_node(writer, child)?;
                }
                writer.write_event(Event::End(end))?;
            }
        }
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::Raw(event) => writer.write_event(event.clone())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><!-- note --><w:body><w:p><w:r><w:t xml:space="preserve">Hello &amp; {Name}</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn parses_nested_elements() {
        let doc = parse(SAMPLE).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.name, "w:document");
        assert_eq!(root.attr("xmlns:w"), Some("urn:w"));
        let body = root.child("w:body").unwrap();
        assert_eq!(body.elements().count(), 2);
        let t = body
            .child("w:p")
            .and_then(|p| p.child("w:r"))
            .and_then(|r| r.child("w:t"))
            .unwrap();
        assert_eq!(t.text(), "Hello & {Name}");
        assert_eq!(t.attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn write_reproduces_structure() {
        let doc = parse(SAMPLE).unwrap();
        let bytes = write(&doc).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\""));
        assert!(text.contains("<!-- note -->"));
        assert!(text.contains("Hello &amp; {Name}"));
        assert!(text.contains("<w:sectPr/>"));
        assert_eq!(parse(&text).unwrap(), doc);
    }

    #[test]
    fn unclosed_element_is_an_error() {
        assert!(parse("<a><b></b>").is_err());
    }

    #[test]
    fn set_attr_replaces_existing_value() {
        let mut e = XmlElement::new("w:t").with_attr("xml:space", "default");
        e.set_attr("xml:space", "preserve");
        assert_eq!(e.attributes.len(), 1);
        assert_eq!(e.attr("xml:space"), Some("preserve"));
    }
}

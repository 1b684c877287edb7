//! Minimal owned element tree over `quick-xml` events.
//!
//! Element and attribute names are stored by local name, so lookups ignore
//! namespace prefixes.

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

#[derive(thiserror::Error, Debug)]
pub enum XmlError {
    #[error("malformed xml at byte {position}: {message}")]
    Malformed { position: usize, message: String },
    #[error("xml document has no root element")]
    NoRoot,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    /// Parse a whole document and return its root element.
    pub fn parse(doc: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(doc);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| XmlError::Malformed {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;

            match event {
                Event::Start(ref e) => stack.push(element_from_start(e)),
                Event::Empty(ref e) => {
                    let el = element_from_start(e);
                    attach(&mut stack, &mut root, el);
                }
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| XmlError::Malformed {
                        position: reader.buffer_position(),
                        message: "unexpected closing tag".to_string(),
                    })?;
                    attach(&mut stack, &mut root, el);
                }
                Event::Text(e) => {
                    if let Some(top) = stack.last_mut() {
                        // Unknown entities are kept verbatim rather than failing the document.
                        let text = match e.unescape() {
                            Ok(t) => t.into_owned(),
                            Err(_) => String::from_utf8_lossy(&e).into_owned(),
                        };
                        top.text.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Malformed {
                position: doc.len(),
                message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
            });
        }

        root.ok_or(XmlError::NoRoot)
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All elements below this one in document order, excluding itself.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    pub fn descendants_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.descendants().filter(move |d| d.name == name)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

fn element_from_start(e: &BytesStart) -> XmlElement {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }

    XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    }
}

use crate::{Error, Result};

use indexmap::IndexMap;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One element of a parsed mapper or configuration document.
///
/// A deliberately small owned DOM: the template compiler walks elements,
/// reads attributes, and clones subtrees during include expansion, nothing
/// more.
#[derive(Debug, Clone, PartialEq)]
pub struct XNode {
    name: String,
    attrs: IndexMap<String, String>,
    children: Vec<XContent>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XContent {
    Element(XNode),
    Text(String),
}

impl XNode {
    pub fn new(name: impl Into<String>) -> XNode {
        XNode {
            name: name.into(),
            attrs: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Parses a document and returns its root element.
    pub fn parse_document(xml: &str) -> Result<XNode> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XNode> = Vec::new();
        let mut root: Option<XNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    stack.push(element_from_start(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let node = element_from_start(&start)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| Error::parse("unbalanced closing tag"))?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|err| Error::parse(format!("invalid text node: {err}")))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XContent::Text(text.into_owned()));
                    } else if !text.trim().is_empty() {
                        return Err(Error::parse("text outside the document root"));
                    }
                }
                Ok(Event::CData(cdata)) => {
                    let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XContent::Text(text));
                    }
                }
                Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(err) => return Err(Error::parse(format!("malformed XML: {err}"))),
            }
        }

        if !stack.is_empty() {
            return Err(Error::parse("unclosed element at end of document"));
        }
        root.ok_or_else(|| Error::parse("document has no root element"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn attr_required(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            Error::parse(format!(
                "element <{}> requires attribute `{name}`",
                self.name
            ))
        })
    }

    pub fn attrs(&self) -> &IndexMap<String, String> {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn children(&self) -> &[XContent] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<XContent> {
        &mut self.children
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XContent::Text(text.into()));
    }

    pub fn push_element(&mut self, node: XNode) {
        self.children.push(XContent::Element(node));
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XNode> {
        self.children.iter().filter_map(|child| match child {
            XContent::Element(node) => Some(node),
            XContent::Text(_) => None,
        })
    }

    /// The first child element with the given name.
    pub fn element(&self, name: &str) -> Option<&XNode> {
        self.elements().find(|node| node.name == name)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XContent::Text(text) => Some(text.as_str()),
                XContent::Element(_) => None,
            })
            .collect()
    }

    /// Concatenated text content of this element and all descendants, in
    /// document order.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XContent::Text(text) => out.push_str(text),
                XContent::Element(node) => out.push_str(&node.deep_text()),
            }
        }
        out
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<XNode> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = XNode::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| Error::parse(format!("invalid attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::parse(format!("invalid attribute value: {err}")))?
            .into_owned();
        node.attrs.insert(key, value);
    }
    Ok(node)
}

fn attach(stack: &mut Vec<XNode>, root: &mut Option<XNode>, node: XNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XContent::Element(node));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(Error::parse("document has more than one root element"));
            }
            *root = Some(node);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements() {
        let root = XNode::parse_document(
            r#"<mapper namespace="app.UserMapper">
                 <select id="findById" resultType="user">
                   SELECT * FROM users WHERE id = #{id}
                 </select>
               </mapper>"#,
        )
        .unwrap();

        assert_eq!(root.name(), "mapper");
        assert_eq!(root.attr("namespace"), Some("app.UserMapper"));

        let select = root.element("select").unwrap();
        assert_eq!(select.attr("id"), Some("findById"));
        assert!(select.text().contains("WHERE id = #{id}"));
    }

    #[test]
    fn keeps_cdata_verbatim() {
        let root =
            XNode::parse_document("<sql id=\"cond\"><![CDATA[a < b AND c > d]]></sql>").unwrap();
        assert_eq!(root.text(), "a < b AND c > d");
    }

    #[test]
    fn unescapes_entities() {
        let root = XNode::parse_document("<if test=\"age &gt; 0\">x</if>").unwrap();
        assert_eq!(root.attr("test"), Some("age > 0"));
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(XNode::parse_document("<a><b></a>").is_err());
        assert!(XNode::parse_document("").is_err());
        assert!(XNode::parse_document("<a/><b/>").is_err());
    }
}

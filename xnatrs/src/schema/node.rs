//! Generic XML element tree for schema documents.
//!
//! The schema parser is a tree walk over [SchemaNode]s; this module is the
//! only place that touches the XML library, so the parser stays independent
//! of where a document came from (file, server response, test literal).

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

use crate::errors::SchemaError;

/// The XML Schema namespace.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";
/// The XNAT `xdat` extension namespace.
pub const XDAT_NS: &str = "http://nrg.wustl.edu/xdat";

/// One element of a schema document: namespace-expanded tag, attributes,
/// text content and child elements.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub namespace: String,
    pub local: String,
    pub attributes: HashMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// The fully-expanded tag in `{namespace}local` form, the spelling used
    /// by the dispatch table and diagnostics.
    pub fn tag(&self) -> String {
        if self.namespace.is_empty() {
            self.local.clone()
        } else {
            format!("{{{}}}{}", self.namespace, self.local)
        }
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace == namespace && self.local == local
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Read an XML document into a [SchemaNode] tree.
pub fn parse_document(xml: &str) -> Result<SchemaNode, SchemaError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<SchemaNode> = Vec::new();
    let mut root: Option<SchemaNode> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(ref e))) => {
                let node = make_node(&ns, e)?;
                stack.push(node);
            }
            Ok((ns, Event::Empty(ref e))) => {
                let node = make_node(&ns, e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok((_, Event::End(_))) => {
                let node = stack.pop().ok_or_else(|| {
                    SchemaError::MalformedDocument("unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok((_, Event::Text(ref t))) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(t.as_ref()).trim().to_string();
                    if !text.is_empty() {
                        match &mut top.text {
                            Some(existing) => existing.push_str(&text),
                            slot => *slot = Some(text),
                        }
                    }
                }
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => return Err(SchemaError::MalformedDocument(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(SchemaError::MalformedDocument(
            "document ended with unclosed elements".to_string(),
        ));
    }
    root.ok_or_else(|| SchemaError::MalformedDocument("empty document".to_string()))
}

fn make_node(ns: &ResolveResult, e: &BytesStart<'_>) -> Result<SchemaNode, SchemaError> {
    let namespace = match ns {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        _ => String::new(),
    };
    let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    let mut attributes = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SchemaError::MalformedDocument(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        attributes.insert(key, value);
    }

    Ok(SchemaNode {
        namespace,
        local,
        attributes,
        text: None,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [SchemaNode],
    root: &mut Option<SchemaNode>,
    node: SchemaNode,
) -> Result<(), SchemaError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(SchemaError::MalformedDocument(
            "multiple root elements".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_expanded_namespaces() {
        let xml = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:complexType name="projectData">
                <xs:attribute name="ID" type="xs:string"/>
            </xs:complexType>
        </xs:schema>"#;
        let root = parse_document(xml).unwrap();
        assert!(root.is(XS_NS, "schema"));
        assert_eq!(root.children.len(), 1);
        let complex = &root.children[0];
        assert_eq!(complex.tag(), format!("{{{XS_NS}}}complexType"));
        assert_eq!(complex.attr("name"), Some("projectData"));
        assert_eq!(complex.children[0].attr("type"), Some("xs:string"));
    }

    #[test]
    fn captures_text_content() {
        let xml = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:documentation>  An individual person  </xs:documentation>
        </xs:schema>"#;
        let root = parse_document(xml).unwrap();
        assert_eq!(root.children[0].text.as_deref(), Some("An individual person"));
    }

    #[test]
    fn rejects_malformed_markup() {
        assert!(matches!(
            parse_document("<html><body>login page"),
            Err(SchemaError::MalformedDocument(_))
        ));
    }
}

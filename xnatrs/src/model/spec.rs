//! Runtime class metadata. The synthesizer turns parsed descriptors into
//! [ClassSpec] values; objects consult their spec for every property access,
//! so the spec is the single table driving the dynamic surface of a class.

use crate::convert::ScalarType;
use crate::schema::Restrictions;
use crate::types::XsiType;

/// What a class instance is backed by at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Addressable REST resource with its own URI.
    Object,
    /// Embedded in an owner's document, addressed through the owner.
    SubObject,
}

/// The element type of a repeated field.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingElement {
    /// Elements are objects of the given class.
    Class(XsiType),
    /// Elements are bare values.
    Scalar(ScalarType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Scalar {
        type_: ScalarType,
        restrictions: Restrictions,
    },
    /// Fixed by the schema; readable, never writable.
    Constant { value: String },
    /// An embedded complex-typed field.
    SubObject { xsi_type: XsiType },
    Listing {
        element: ListingElement,
        /// Path under the owner's URI, possibly multi-segment.
        uri_segment: String,
        secondary_lookup: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Field name as the server spells it; also the URI path segment.
    pub name: String,
    pub kind: PropertyKind,
    pub docstring: Option<String>,
}

impl Property {
    pub fn scalar(name: &str, type_: ScalarType) -> Self {
        Property {
            name: name.to_string(),
            kind: PropertyKind::Scalar {
                type_,
                restrictions: Restrictions::default(),
            },
            docstring: None,
        }
    }

    pub fn listing(name: &str, uri_segment: &str, element_xsi: &str, secondary_lookup: Option<&str>) -> Self {
        Property {
            name: name.to_string(),
            kind: PropertyKind::Listing {
                element: ListingElement::Class(XsiType::from(element_xsi)),
                uri_segment: uri_segment.to_string(),
                secondary_lookup: secondary_lookup.map(str::to_string),
            },
            docstring: None,
        }
    }
}

/// Complete runtime description of one generated class. Base-class
/// properties are flattened in at synthesis time, so `properties` is the
/// full surface; `base` remains for ancestry checks.
#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: String,
    /// Registration identifier, unique in the registry.
    pub xsi_type: XsiType,
    pub base: Option<XsiType>,
    pub kind: ObjectKind,
    pub abstract_: bool,
    /// For nested classes: the field of the enclosing class holding them.
    pub field_name: Option<String>,
    pub display_identifier: Option<String>,
    pub properties: Vec<Property>,
}

impl ClassSpec {
    /// The wire type string a query subsystem addresses this class by.
    pub fn query_identifier(&self) -> &XsiType {
        &self.xsi_type
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Add or replace a property by name, keeping position on replace so
    /// subclass redefinitions do not reorder the surface.
    pub fn upsert_property(&mut self, prop: Property) {
        match self.properties.iter().position(|p| p.name == prop.name) {
            Some(pos) => self.properties[pos] = prop,
            None => self.properties.push(prop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_in_place() {
        let mut spec = ClassSpec {
            name: "SubjectData".into(),
            xsi_type: XsiType::from("xnat:subjectData"),
            base: None,
            kind: ObjectKind::Object,
            abstract_: false,
            field_name: None,
            display_identifier: None,
            properties: vec![
                Property::scalar("label", ScalarType::String),
                Property::scalar("group", ScalarType::String),
            ],
        };
        spec.upsert_property(Property::scalar("label", ScalarType::Int));
        assert_eq!(spec.properties.len(), 2);
        assert_eq!(spec.properties[0].name, "label");
        assert!(matches!(
            spec.properties[0].kind,
            PropertyKind::Scalar { type_: ScalarType::Int, .. }
        ));
    }
}

//! In-memory descriptions of schema types and their attributes, prior to
//! runtime type construction.

use std::fmt;

/// How an attribute prototype will be rendered once finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrototypeKind {
    /// A plain scalar field.
    Scalar,
    /// An embedded complex-typed field.
    NestedObject,
    /// A repeated element (`maxOccurs="unbounded"`).
    Listing,
    /// A fixed value from the schema.
    Constant,
}

/// Value restrictions accumulated from `xs:restriction` facets. Checked on
/// write, never on parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Restrictions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub enum_values: Option<Vec<String>>,
}

impl Restrictions {
    pub fn is_empty(&self) -> bool {
        self.min.is_none()
            && self.max.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.enum_values.is_none()
    }
}

/// One property of a class, as collected incrementally during the descent.
/// Finalized into a concrete property by the synthesizer once all descriptors
/// exist (forward references may not resolve before then).
#[derive(Debug, Clone)]
pub struct AttributePrototype {
    pub kind: PrototypeKind,
    pub name: String,
    /// Primitive type tag (`xs:...`) or a reference to another schema type.
    pub type_: Option<String>,
    pub restrictions: Restrictions,
    pub docstring: Option<String>,
    /// Name of the descriptor for repeated/embedded complex content.
    pub element_class: Option<String>,
    /// Secondary key of listing elements, from `xdat:element`.
    pub display_identifier: Option<String>,
    /// Fixed value for [PrototypeKind::Constant].
    pub value: Option<String>,
}

impl AttributePrototype {
    pub fn new(kind: PrototypeKind, name: &str, type_: Option<&str>) -> Self {
        AttributePrototype {
            kind,
            name: name.to_string(),
            type_: type_.map(str::to_string),
            restrictions: Restrictions::default(),
            docstring: None,
            element_class: None,
            display_identifier: None,
            value: None,
        }
    }
}

/// The base a descriptor extends: another descriptor by name, or a schema
/// primitive (`xs:...`) marker for synthesized wrapper classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseRef {
    Class(String),
    Primitive(String),
}

impl fmt::Display for BaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseRef::Class(name) => f.write_str(name),
            BaseRef::Primitive(name) => f.write_str(name),
        }
    }
}

/// One schema-defined type.
///
/// The xsi type is kept as `(name, extension)`: named top-level types have an
/// empty extension, anonymous nested types extend their enclosing type's
/// identifier with `/<field>` segments. Qualification against the top-level
/// element map happens at synthesis time.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    pub xsi_name: String,
    pub xsi_extension: String,
    pub base: Option<BaseRef>,
    /// Enclosing class name; set only for anonymous/nested types.
    pub parent: Option<String>,
    /// Field of the enclosing type that owns this type.
    pub field_name: Option<String>,
    /// True for types only reachable as an embedded field slice.
    pub sub_object: bool,
    pub abstract_: bool,
    pub display_identifier: Option<String>,
    /// Ordered attribute prototypes. Order matters: generated properties keep
    /// schema order.
    pub attributes: Vec<AttributePrototype>,
}

impl ClassDescriptor {
    pub fn new(name: &str, xsi_name: &str, xsi_extension: &str) -> Self {
        ClassDescriptor {
            name: name.to_string(),
            xsi_name: xsi_name.to_string(),
            xsi_extension: xsi_extension.to_string(),
            base: None,
            parent: None,
            field_name: None,
            sub_object: false,
            abstract_: false,
            display_identifier: None,
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributePrototype> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut AttributePrototype> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }

    /// Add or replace an attribute, preserving the position of a replaced one.
    pub fn push_attribute(&mut self, attr: AttributePrototype) {
        match self.attributes.iter_mut().find(|a| a.name == attr.name) {
            Some(slot) => *slot = attr,
            None => self.attributes.push(attr),
        }
    }
}

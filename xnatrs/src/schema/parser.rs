//! The schema parser: walks XML type-schema documents and builds class
//! descriptors with inheritance, nesting and repetition resolved.
//!
//! Multiple documents may be parsed into one parser; they form a single
//! descriptor namespace. Forward references between descriptors are left for
//! the synthesizer, which consumes descriptors in [SchemaParser::topological_order].

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::constants::TOPO_ITERATION_CAP;
use crate::errors::SchemaError;
use crate::schema::descriptor::{
    AttributePrototype, BaseRef, ClassDescriptor, PrototypeKind,
};
use crate::schema::node::{parse_document, SchemaNode, XDAT_NS, XS_NS};

/// Python-style capitalization: first char upper, remainder lower. Anonymous
/// class names are derived this way, so it is part of the naming contract.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Turn a schema type name into a class name: underscore-separated parts with
/// their first letter raised (`image_session` -> `ImageSession`).
pub(crate) fn class_name(s: &str) -> String {
    s.split('_')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut chars = p.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

pub struct SchemaParser {
    classes: Vec<ClassDescriptor>,
    class_index: HashMap<String, usize>,
    /// Top-level element name -> qualified xsi type, used to qualify class
    /// identifiers at synthesis time.
    xsi_mapping: HashMap<String, String>,
    unknown_tags: BTreeSet<String>,
    schemas: Vec<String>,
    class_stack: Vec<usize>,
    property_stack: Vec<(usize, usize)>,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaParser {
    pub fn new() -> Self {
        SchemaParser {
            classes: Vec::new(),
            class_index: HashMap::new(),
            xsi_mapping: HashMap::new(),
            unknown_tags: BTreeSet::new(),
            schemas: Vec::new(),
            class_stack: Vec::new(),
            property_stack: Vec::new(),
        }
    }

    /// Parse one schema document. The root element must be an XML Schema
    /// root; anything else is a structural error.
    pub fn parse_string(&mut self, xml: &str, schema_uri: &str) -> Result<(), SchemaError> {
        let root = parse_document(xml)?;
        if !root.is(XS_NS, "schema") {
            return Err(SchemaError::NotASchema(root.tag()));
        }
        self.schemas.push(schema_uri.to_string());

        for child in &root.children {
            if child.is(XS_NS, "complexType") {
                self.dispatch(child)?;
            } else if child.is(XS_NS, "element") {
                if let (Some(name), Some(type_)) = (child.attr("name"), child.attr("type")) {
                    debug!(name, type_, "adding top-level element to xsi map");
                    self.xsi_mapping
                        .insert(name.to_string(), type_.to_string());
                }
            } else {
                debug!(tag = child.tag(), "skipping non-class top-level tag");
            }
        }

        if !self.unknown_tags.is_empty() {
            debug!(tags = ?self.unknown_tags, "encountered unknown schema tags");
        }
        Ok(())
    }

    /// URIs of the schema documents parsed so far.
    pub fn schemas(&self) -> &[String] {
        &self.schemas
    }

    /// Tags the parser had no rule for; they were skipped, never fatal.
    pub fn unknown_tags(&self) -> &BTreeSet<String> {
        &self.unknown_tags
    }

    pub fn descriptors(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    pub fn descriptor(&self, name: &str) -> Option<&ClassDescriptor> {
        self.class_index.get(name).map(|&i| &self.classes[i])
    }

    /// Qualified xsi type of a descriptor (`xnat:projectData`,
    /// `xnat:projectData/studyprotocol`).
    pub fn xsi_type(&self, desc: &ClassDescriptor) -> String {
        match self.xsi_mapping.get(&desc.xsi_name) {
            Some(mapped) => format!("{}{}", mapped, desc.xsi_extension),
            None => format!("xnat:{}", desc.xsi_name),
        }
    }

    /// Identifier the descriptor's class is registered under. Anonymous
    /// nested types and synthesized primitive wrappers are not part of the
    /// canonical namespace, so they get the vendor `xnatpy:` prefix to avoid
    /// colliding with server-defined identifiers.
    pub fn xsi_type_registration(&self, desc: &ClassDescriptor) -> String {
        if desc.xsi_name.is_empty() {
            return format!("xnatpy:{}", desc.name);
        }
        match self.xsi_mapping.get(&desc.xsi_name) {
            Some(mapped) => format!("{}{}", mapped, desc.xsi_extension),
            None if desc.xsi_extension.is_empty() => format!("xnat:{}", desc.xsi_name),
            None => format!("xnatpy:{}", desc.name),
        }
    }

    /// Descriptor indices in an order consumable by single-pass synthesis:
    /// bases before derivatives, enclosing classes before nested ones.
    ///
    /// Implemented as repeated full scans: a descriptor becomes visitable
    /// once its base is primitive/absent or visited, and its enclosing class
    /// (if any) is visited. A scan with no progress, or hitting the iteration
    /// cap, ends the loop; whatever is left is returned as unresolved and
    /// excluded from generation rather than failing the conversion.
    pub fn topological_order(&self) -> (Vec<usize>, Vec<String>) {
        let mut order = Vec::with_capacity(self.classes.len());
        let mut visited = vec![false; self.classes.len()];
        let mut tries = 0;
        let mut progressed = true;

        while order.len() < self.classes.len() && progressed && tries < TOPO_ITERATION_CAP {
            progressed = false;
            for (idx, desc) in self.classes.iter().enumerate() {
                if visited[idx] {
                    continue;
                }
                let base_ready = match &desc.base {
                    None | Some(BaseRef::Primitive(_)) => true,
                    Some(BaseRef::Class(name)) => self
                        .class_index
                        .get(name)
                        .map(|&i| visited[i])
                        // A base that is not a descriptor at all resolves to
                        // a runtime root kind; nothing to wait for.
                        .unwrap_or(true),
                };
                if !base_ready {
                    continue;
                }
                if let Some(parent) = &desc.parent {
                    let parent_ready = self
                        .class_index
                        .get(parent)
                        .map(|&i| visited[i])
                        .unwrap_or(true);
                    if !parent_ready {
                        continue;
                    }
                }
                visited[idx] = true;
                order.push(idx);
                progressed = true;
            }
            tries += 1;
        }

        let unresolved: Vec<String> = self
            .classes
            .iter()
            .enumerate()
            .filter(|(i, _)| !visited[*i])
            .map(|(_, d)| d.name.clone())
            .collect();
        for name in &unresolved {
            warn!(class = %name, "descriptor has unresolvable dependencies, excluded from generation");
        }
        debug!(
            visited = order.len(),
            total = self.classes.len(),
            iterations = tries,
            "topological emission finished"
        );
        (order, unresolved)
    }

    fn current_class(&self) -> Option<usize> {
        self.class_stack.last().copied()
    }

    fn current_property(&self) -> Option<(usize, usize)> {
        self.property_stack.last().copied()
    }

    fn property_mut(&mut self, (class, attr): (usize, usize)) -> &mut AttributePrototype {
        &mut self.classes[class].attributes[attr]
    }

    /// Insert a descriptor, replacing an existing entry only when it refers
    /// to the same schema type (re-parsed document, duplicated primitive
    /// wrapper). A name clash between different types is a conflict.
    fn add_class(&mut self, desc: ClassDescriptor) -> Result<usize, SchemaError> {
        if let Some(&idx) = self.class_index.get(&desc.name) {
            let existing = &self.classes[idx];
            if existing.xsi_name != desc.xsi_name || existing.xsi_extension != desc.xsi_extension {
                return Err(SchemaError::DuplicateType(desc.name));
            }
            self.classes[idx] = desc;
            return Ok(idx);
        }
        let idx = self.classes.len();
        self.class_index.insert(desc.name.clone(), idx);
        self.classes.push(desc);
        Ok(idx)
    }

    fn add_attribute(&mut self, class: usize, attr: AttributePrototype) -> usize {
        let attrs = &mut self.classes[class].attributes;
        match attrs.iter().position(|a| a.name == attr.name) {
            Some(pos) => {
                attrs[pos] = attr;
                pos
            }
            None => {
                attrs.push(attr);
                attrs.len() - 1
            }
        }
    }

    fn with_class<F>(&mut self, idx: usize, f: F) -> Result<(), SchemaError>
    where
        F: FnOnce(&mut Self) -> Result<(), SchemaError>,
    {
        self.class_stack.push(idx);
        let result = f(self);
        self.class_stack.pop();
        result
    }

    fn with_property<F>(&mut self, key: (usize, usize), f: F) -> Result<(), SchemaError>
    where
        F: FnOnce(&mut Self) -> Result<(), SchemaError>,
    {
        self.property_stack.push(key);
        let result = f(self);
        self.property_stack.pop();
        result
    }

    fn parse_children(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        for child in &node.children {
            self.dispatch(child)?;
        }
        Ok(())
    }

    /// The fixed tag -> handling rule table.
    fn dispatch(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        if node.namespace == XS_NS {
            match node.local.as_str() {
                "all" | "annotation" | "appinfo" | "choice" | "complexContent" | "schema"
                | "sequence" | "simpleContent" | "simpleType" => self.parse_children(node),
                "attribute" => self.parse_attribute(node),
                "complexType" => self.parse_complex_type(node),
                "documentation" => self.parse_documentation(node),
                "element" => self.parse_element(node),
                "enumeration" => self.parse_enumeration(node),
                "extension" => self.parse_extension(node),
                "import" => Ok(()),
                "attributeGroup" | "group" => Err(SchemaError::UnsupportedTag(node.tag())),
                "maxInclusive" => self.parse_facet(node, Facet::Max),
                "minInclusive" => self.parse_facet(node, Facet::Min),
                "maxLength" => self.parse_facet(node, Facet::MaxLength),
                "minLength" => self.parse_facet(node, Facet::MinLength),
                "restriction" => self.parse_restriction(node),
                _ => self.parse_unknown(node),
            }
        } else if node.namespace == XDAT_NS {
            match node.local.as_str() {
                "element" => self.parse_xdat_element(node),
                "field" => self.parse_children(node),
                "sqlField" => {
                    debug!(tag = node.tag(), "ignoring sql field annotation");
                    Ok(())
                }
                _ => self.parse_unknown(node),
            }
        } else {
            self.parse_unknown(node)
        }
    }

    fn parse_unknown(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        self.unknown_tags.insert(node.tag());
        Ok(())
    }

    fn parse_attribute(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        let Some(class) = self.current_class() else {
            return Ok(());
        };
        let Some(name) = node.attr("name") else {
            debug!("encountered attribute without name");
            return Ok(());
        };

        let proto = if let Some(fixed) = node.attr("fixed") {
            let mut proto = AttributePrototype::new(PrototypeKind::Constant, name, node.attr("type"));
            proto.value = Some(fixed.to_string());
            proto
        } else {
            AttributePrototype::new(PrototypeKind::Scalar, name, node.attr("type"))
        };

        let attr = self.add_attribute(class, proto);
        self.with_property((class, attr), |p| p.parse_children(node))
    }

    fn parse_complex_type(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        let desc = match node.attr("name") {
            Some(name) => ClassDescriptor::new(name, name, ""),
            None => {
                // Anonymous type inside a field definition: synthesize the
                // name from the enclosing class and field, mark it as a
                // sub-object and extend the enclosing xsi identifier.
                let (Some(class), Some(prop)) = (self.current_class(), self.current_property())
                else {
                    debug!("anonymous complexType outside a field definition, skipping");
                    return Ok(());
                };
                let enclosing = &self.classes[class];
                let field = self.classes[prop.0].attributes[prop.1].name.clone();
                let mut desc = ClassDescriptor::new(
                    &format!("{}{}", enclosing.name, capitalize(&field)),
                    &enclosing.xsi_name,
                    &format!("{}/{}", enclosing.xsi_extension, field),
                );
                desc.parent = Some(enclosing.name.clone());
                desc.field_name = Some(field);
                desc.sub_object = true;
                desc
            }
        };

        let name = desc.name.clone();
        let idx = self.add_class(desc)?;
        if let Some(prop) = self.current_property() {
            self.property_mut(prop).element_class = Some(name);
        }
        self.with_class(idx, |p| p.parse_children(node))
    }

    fn parse_documentation(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        if let Some(prop) = self.current_property() {
            self.property_mut(prop).docstring = node.text.clone();
        }
        Ok(())
    }

    fn parse_element(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        let Some(name) = node.attr("name") else {
            if let Some(abstract_) = node.attr("abstract") {
                if let Some(class) = self.current_class() {
                    self.classes[class].abstract_ = abstract_ == "true";
                }
            } else {
                debug!("encountered element without name");
            }
            return Ok(());
        };
        let type_ = node.attr("type");

        let Some(class) = self.current_class() else {
            if let Some(type_) = type_ {
                self.xsi_mapping.insert(name.to_string(), type_.to_string());
            }
            return Ok(());
        };

        let kind = if node.attr("maxOccurs") == Some("unbounded") {
            PrototypeKind::Listing
        } else if type_.is_some_and(|t| t.starts_with("xs:")) {
            PrototypeKind::Scalar
        } else {
            PrototypeKind::NestedObject
        };

        let attr = self.add_attribute(class, AttributePrototype::new(kind, name, type_));
        self.with_property((class, attr), |p| p.parse_children(node))
    }

    fn parse_enumeration(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        let (Some(prop), Some(value)) = (self.current_property(), node.attr("value")) else {
            return Ok(());
        };
        let value = value.to_string();
        self.property_mut(prop)
            .restrictions
            .enum_values
            .get_or_insert_with(Vec::new)
            .push(value);
        Ok(())
    }

    fn parse_extension(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        let Some(base) = node.attr("base") else {
            return self.parse_children(node);
        };
        let Some(class) = self.current_class() else {
            return self.parse_children(node);
        };

        let new_base = if let Some(primitive) = base.strip_prefix("xs:") {
            // The base is a schema primitive, which cannot be extended
            // directly: synthesize a wrapper class representing the primitive
            // promoted to an attribute, and extend that instead.
            let suffix = capitalize(primitive);
            let property_name = match self.current_property() {
                Some(prop) => self.classes[prop.0].attributes[prop.1].name.clone(),
                None => self.classes[class].name.to_lowercase(),
            };
            let wrapper_name = match self.current_property() {
                Some(_) => format!("{}{}", capitalize(&property_name), suffix),
                None => format!("{}{}", class_name(&self.classes[class].name), suffix),
            };

            let mut wrapper = ClassDescriptor::new(&wrapper_name, "", "");
            wrapper.sub_object = true;
            wrapper.base = Some(BaseRef::Primitive(base.to_string()));
            wrapper.push_attribute(AttributePrototype::new(
                PrototypeKind::Scalar,
                &property_name,
                Some(base),
            ));
            self.add_class(wrapper)?;
            wrapper_name
        } else {
            base.split_once(':').map(|(_, l)| l).unwrap_or(base).to_string()
        };

        let desc = &mut self.classes[class];
        match &desc.base {
            Some(old) if old.to_string() != new_base => {
                return Err(SchemaError::BaseClassConflict {
                    class: desc.name.clone(),
                    old: old.to_string(),
                    new: new_base,
                });
            }
            _ => desc.base = Some(BaseRef::Class(new_base)),
        }

        self.parse_children(node)
    }

    fn parse_facet(&mut self, node: &SchemaNode, facet: Facet) -> Result<(), SchemaError> {
        let (Some(prop), Some(value)) = (self.current_property(), node.attr("value")) else {
            return Ok(());
        };
        let value = value.to_string();
        let restrictions = &mut self.property_mut(prop).restrictions;
        match facet {
            Facet::Min => restrictions.min = value.parse().ok(),
            Facet::Max => restrictions.max = value.parse().ok(),
            Facet::MinLength => restrictions.min_length = value.parse().ok(),
            Facet::MaxLength => restrictions.max_length = value.parse().ok(),
        }
        Ok(())
    }

    fn parse_restriction(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        if let (Some(prop), Some(base)) = (self.current_property(), node.attr("base")) {
            let attr = self.property_mut(prop);
            if let Some(old) = &attr.type_ {
                return Err(SchemaError::RestrictionConflict {
                    attribute: attr.name.clone(),
                    old: old.clone(),
                    new: base.to_string(),
                });
            }
            attr.type_ = Some(base.to_string());
        }
        self.parse_children(node)
    }

    fn parse_xdat_element(&mut self, node: &SchemaNode) -> Result<(), SchemaError> {
        if let Some(abstract_) = node.attr("abstract") {
            if let Some(class) = self.current_class() {
                self.classes[class].abstract_ = abstract_ == "true";
            }
        }
        if let Some(display) = node.attr("displayIdentifiers") {
            match self.current_property() {
                Some(prop) => self.property_mut(prop).display_identifier = Some(display.to_string()),
                None => {
                    if let Some(class) = self.current_class() {
                        self.classes[class].display_identifier = Some(display.to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

enum Facet {
    Min,
    Max,
    MinLength,
    MaxLength,
}

/// Extract the `.xsd` schema locations referenced anywhere in an XML
/// document (`xsi:schemaLocation` on the root, `xs:import` elements), for
/// discovering extension schemas from a server response.
pub fn find_schema_uris(text: &str) -> Result<Vec<String>, SchemaError> {
    let root = parse_document(text)?;
    let mut uris = Vec::new();
    collect_schema_locations(&root, &mut uris);
    Ok(uris)
}

fn collect_schema_locations(node: &SchemaNode, out: &mut Vec<String>) {
    if let Some(location) = node
        .attributes
        .iter()
        .find(|(k, _)| k.ends_with("schemaLocation"))
        .map(|(_, v)| v.as_str())
    {
        for uri in location.split_whitespace().filter(|x| x.ends_with(".xsd")) {
            if !out.iter().any(|u| u == uri) {
                out.push(uri.to_string());
            }
        }
    }
    for child in &node.children {
        collect_schema_locations(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    const PREAMBLE: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:xnat="http://nrg.wustl.edu/xnat" xmlns:xdat="http://nrg.wustl.edu/xdat">"#;

    fn parse(body: &str) -> SchemaParser {
        let mut parser = SchemaParser::new();
        let xml = format!("{PREAMBLE}{body}</xs:schema>");
        parser.parse_string(&xml, "file://test.xsd").unwrap();
        parser
    }

    #[test]
    fn non_schema_root_is_a_structural_error() {
        let mut parser = SchemaParser::new();
        let result = parser.parse_string("<foo><bar/></foo>", "file://bad.xsd");
        assert!(matches!(result, Err(SchemaError::NotASchema(_))));
    }

    #[test]
    fn top_level_elements_qualify_xsi_types() {
        let parser = parse(
            r#"<xs:element name="projectData" type="xnat:projectData"/>
               <xs:complexType name="projectData"/>"#,
        );
        let desc = parser.descriptor("projectData").unwrap();
        assert_eq!(parser.xsi_type(desc), "xnat:projectData");
        assert_eq!(parser.xsi_type_registration(desc), "xnat:projectData");
    }

    #[test]
    fn anonymous_complex_type_becomes_named_sub_object() {
        let parser = parse(
            r#"<xs:complexType name="subjectData">
                 <xs:sequence>
                   <xs:element name="demographics">
                     <xs:complexType>
                       <xs:attribute name="age" type="xs:integer"/>
                     </xs:complexType>
                   </xs:element>
                 </xs:sequence>
               </xs:complexType>"#,
        );
        let nested = parser.descriptor("subjectDataDemographics").unwrap();
        assert!(nested.sub_object);
        assert_eq!(nested.parent.as_deref(), Some("subjectData"));
        assert_eq!(nested.field_name.as_deref(), Some("demographics"));
        assert_eq!(nested.xsi_extension, "/demographics");
        assert!(nested.attribute("age").is_some());
        // The owning field points back at the synthesized class.
        let owner = parser.descriptor("subjectData").unwrap();
        assert_eq!(
            owner.attribute("demographics").unwrap().element_class.as_deref(),
            Some("subjectDataDemographics")
        );
        // Anonymous types register under the vendor prefix.
        assert_eq!(parser.xsi_type_registration(nested), "xnatpy:subjectDataDemographics");
    }

    #[test]
    fn primitive_base_synthesizes_wrapper_class() {
        let parser = parse(
            r#"<xs:complexType name="ageData">
                 <xs:simpleContent>
                   <xs:extension base="xs:float"/>
                 </xs:simpleContent>
               </xs:complexType>"#,
        );
        let desc = parser.descriptor("ageData").unwrap();
        assert_eq!(desc.base, Some(BaseRef::Class("AgeDataFloat".to_string())));
        let wrapper = parser.descriptor("AgeDataFloat").unwrap();
        assert!(wrapper.sub_object);
        assert_eq!(wrapper.base, Some(BaseRef::Primitive("xs:float".to_string())));
        assert_eq!(wrapper.attributes[0].type_.as_deref(), Some("xs:float"));
    }

    #[test]
    fn unbounded_elements_become_listing_prototypes() {
        let parser = parse(
            r#"<xs:complexType name="projectData">
                 <xs:sequence>
                   <xs:element name="subjects" type="xnat:subjectData" maxOccurs="unbounded"/>
                   <xs:element name="description" type="xs:string"/>
                   <xs:element name="pi" type="xnat:investigatorData"/>
                 </xs:sequence>
               </xs:complexType>"#,
        );
        let desc = parser.descriptor("projectData").unwrap();
        assert_eq!(desc.attribute("subjects").unwrap().kind, PrototypeKind::Listing);
        assert_eq!(desc.attribute("description").unwrap().kind, PrototypeKind::Scalar);
        assert_eq!(desc.attribute("pi").unwrap().kind, PrototypeKind::NestedObject);
    }

    #[test]
    fn restrictions_accumulate_on_the_current_attribute() {
        let parser = parse(
            r#"<xs:complexType name="subjectData">
                 <xs:attribute name="group">
                   <xs:simpleType>
                     <xs:restriction base="xs:string">
                       <xs:enumeration value="control"/>
                       <xs:enumeration value="patient"/>
                       <xs:maxLength value="16"/>
                     </xs:restriction>
                   </xs:simpleType>
                 </xs:attribute>
               </xs:complexType>"#,
        );
        let attr = parser
            .descriptor("subjectData")
            .unwrap()
            .attribute("group")
            .unwrap();
        assert_eq!(attr.type_.as_deref(), Some("xs:string"));
        assert_eq!(attr.restrictions.max_length, Some(16));
        assert_eq!(
            attr.restrictions.enum_values.as_deref(),
            Some(["control".to_string(), "patient".to_string()].as_slice())
        );
    }

    #[test]
    fn restriction_redeclaring_a_type_is_a_conflict() {
        let mut parser = SchemaParser::new();
        let xml = format!(
            r#"{PREAMBLE}<xs:complexType name="subjectData">
                 <xs:attribute name="group" type="xs:string">
                   <xs:simpleType>
                     <xs:restriction base="xs:integer"/>
                   </xs:simpleType>
                 </xs:attribute>
               </xs:complexType></xs:schema>"#
        );
        let result = parser.parse_string(&xml, "file://test.xsd");
        assert!(matches!(result, Err(SchemaError::RestrictionConflict { .. })));
    }

    #[test]
    fn unknown_tags_are_collected_not_fatal() {
        let parser = parse(
            r#"<xs:complexType name="projectData">
                 <xs:futureThing/>
               </xs:complexType>"#,
        );
        assert!(parser
            .unknown_tags()
            .iter()
            .any(|t| t.ends_with("}futureThing")));
        assert!(parser.descriptor("projectData").is_some());
    }

    #[test]
    fn display_identifiers_land_on_class_or_attribute() {
        let parser = parse(
            r#"<xs:complexType name="subjectData">
                 <xs:annotation>
                   <xs:appinfo>
                     <xdat:element displayIdentifiers="label"/>
                   </xs:appinfo>
                 </xs:annotation>
               </xs:complexType>"#,
        );
        assert_eq!(
            parser.descriptor("subjectData").unwrap().display_identifier.as_deref(),
            Some("label")
        );
    }

    /// A (base: primitive wrapper), B (base: A), C (nested inside B): the
    /// emission order must be A, B, C no matter the declaration order.
    #[rstest]
    #[case::declared_in_order(true)]
    #[case::declared_reversed(false)]
    fn topological_order_emits_bases_and_parents_first(#[case] forward: bool) {
        let a = r#"<xs:complexType name="alpha">
                     <xs:simpleContent><xs:extension base="xs:string"/></xs:simpleContent>
                   </xs:complexType>"#;
        let b = r#"<xs:complexType name="beta">
                     <xs:complexContent>
                       <xs:extension base="xnat:alpha">
                         <xs:sequence>
                           <xs:element name="frames">
                             <xs:complexType>
                               <xs:attribute name="count" type="xs:integer"/>
                             </xs:complexType>
                           </xs:element>
                         </xs:sequence>
                       </xs:extension>
                     </xs:complexContent>
                   </xs:complexType>"#;
        let body = if forward {
            format!("{a}{b}")
        } else {
            format!("{b}{a}")
        };
        let parser = parse(&body);

        let (order, unresolved) = parser.topological_order();
        assert!(unresolved.is_empty());
        let names: Vec<&str> = order
            .iter()
            .map(|&i| parser.descriptors()[i].name.as_str())
            .collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("alpha") < pos("beta"));
        assert!(pos("beta") < pos("betaFrames"));
    }

    #[test]
    fn missing_base_counts_as_unresolvable_only_when_cyclic() {
        // Self-referential nesting cannot happen, but a base chain that never
        // lands anywhere known resolves as a root kind rather than hanging.
        let parser = parse(r#"<xs:complexType name="orphanData"/>"#);
        let (order, unresolved) = parser.topological_order();
        assert_eq!(order.len(), 1);
        assert!(unresolved.is_empty());
    }

    #[test]
    fn finds_schema_locations() {
        let uris = find_schema_uris(
            r#"<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                xsi:schemaLocation="https://xnat.example.com/schemas/xnat/xnat.xsd other">
               </root>"#,
        )
        .unwrap();
        assert_eq!(uris, vec!["https://xnat.example.com/schemas/xnat/xnat.xsd"]);
    }

    #[test]
    fn finds_imported_schema_locations() {
        let uris = find_schema_uris(&format!(
            r#"{PREAMBLE}<xs:import schemaLocation="/schemas/ext/pet.xsd"/>
               <xs:import schemaLocation="/schemas/ext/pet.xsd"/>
               <xs:complexType name="projectData"/></xs:schema>"#
        ))
        .unwrap();
        assert_eq!(uris, vec!["/schemas/ext/pet.xsd"]);
    }
}

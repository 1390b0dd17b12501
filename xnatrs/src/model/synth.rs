//! Class synthesis: descriptors in, a populated [TypeRegistry] out.
//!
//! The synthesizer consumes descriptors in topological order so that every
//! base class is registered before its derivatives; that lets it flatten the
//! inherited property surface into each spec in a single pass.

use tracing::{debug, warn};

use crate::constants::{self, SECONDARY_LOOKUP_FIELDS};
use crate::convert::ScalarType;
use crate::errors::SchemaError;
use crate::model::overrides;
use crate::model::registry::TypeRegistry;
use crate::model::spec::{ClassSpec, ListingElement, ObjectKind, Property, PropertyKind};
use crate::schema::parser::class_name;
use crate::schema::{
    AttributePrototype, BaseRef, ClassDescriptor, PrototypeKind, SchemaParser,
};
use crate::types::XsiType;

pub struct ClassSynthesizer;

impl ClassSynthesizer {
    /// Build a registry from everything the parser has ingested. Descriptors
    /// with unresolvable dependencies are skipped and recorded on the
    /// registry rather than failing the whole build.
    pub fn build(parser: &SchemaParser) -> Result<TypeRegistry, SchemaError> {
        let mut registry = TypeRegistry::new();
        let (order, unresolved) = parser.topological_order();
        for idx in order {
            let desc = &parser.descriptors()[idx];
            let spec = Self::synthesize(parser, &registry, desc)?;
            registry.register(spec)?;
        }
        // The file class has no schema type; supply it unless an extension
        // schema took over the identifier.
        if registry.resolve(&XsiType::from("xnat:fileData")).is_none() {
            registry.register(overrides::file_data_spec())?;
        }
        registry.set_unresolved(unresolved);
        debug!(classes = registry.len(), "class synthesis complete");
        Ok(registry)
    }

    fn synthesize(
        parser: &SchemaParser,
        registry: &TypeRegistry,
        desc: &ClassDescriptor,
    ) -> Result<ClassSpec, SchemaError> {
        let xsi_type = XsiType::from(parser.xsi_type_registration(desc));
        let base = match &desc.base {
            Some(BaseRef::Class(name)) => parser
                .descriptor(name)
                .map(|d| XsiType::from(parser.xsi_type_registration(d))),
            _ => None,
        };

        // Inherited surface first; own definitions replace in place.
        let properties = match base.as_ref().and_then(|b| registry.resolve(b)) {
            Some(base_spec) => base_spec.properties.clone(),
            None => Vec::new(),
        };

        let mut spec = ClassSpec {
            name: class_name(&desc.name),
            xsi_type,
            base,
            kind: if desc.sub_object {
                ObjectKind::SubObject
            } else {
                ObjectKind::Object
            },
            abstract_: desc.abstract_,
            field_name: desc.field_name.clone(),
            display_identifier: desc.display_identifier.clone(),
            properties,
        };

        for proto in &desc.attributes {
            if let Some(prop) = Self::finalize(parser, desc, proto) {
                spec.upsert_property(prop);
            }
        }
        for prop in overrides::listing_properties(spec.xsi_type.as_str()) {
            spec.upsert_property(prop);
        }
        Ok(spec)
    }

    /// Turn one raw prototype into its final property shape.
    fn finalize(
        parser: &SchemaParser,
        desc: &ClassDescriptor,
        proto: &AttributePrototype,
    ) -> Option<Property> {
        let kind = match proto.kind {
            PrototypeKind::Constant => PropertyKind::Constant {
                value: proto.value.clone().unwrap_or_default(),
            },
            PrototypeKind::Scalar => Self::finalize_scalar(parser, proto),
            PrototypeKind::NestedObject => Self::finalize_nested(parser, desc, proto)?,
            PrototypeKind::Listing => PropertyKind::Listing {
                element: Self::element_of(parser, proto)?,
                uri_segment: proto.name.clone(),
                secondary_lookup: Self::lookup_for(parser, proto),
            },
        };
        Some(Property {
            name: proto.name.clone(),
            kind,
            docstring: proto.docstring.clone(),
        })
    }

    fn finalize_scalar(parser: &SchemaParser, proto: &AttributePrototype) -> PropertyKind {
        match proto.type_.as_deref() {
            // Untyped fields default to strings.
            None => PropertyKind::Scalar {
                type_: ScalarType::String,
                restrictions: proto.restrictions.clone(),
            },
            Some(t) if t.starts_with("xs:") => PropertyKind::Scalar {
                type_: ScalarType::from_xs(t),
                restrictions: proto.restrictions.clone(),
            },
            // A schema-typed attribute is an embedded object in disguise.
            Some(t) => PropertyKind::SubObject {
                xsi_type: resolve_type_ref(parser, t),
            },
        }
    }

    fn finalize_nested(
        parser: &SchemaParser,
        desc: &ClassDescriptor,
        proto: &AttributePrototype,
    ) -> Option<PropertyKind> {
        // Primitive-typed elements parsed before their type was visible.
        if let Some(t) = proto.type_.as_deref() {
            if t.starts_with("xs:") {
                return Some(PropertyKind::Scalar {
                    type_: ScalarType::from_xs(t),
                    restrictions: proto.restrictions.clone(),
                });
            }
        }

        if let Some(element_class) = &proto.element_class {
            let element = parser.descriptor(element_class)?;
            // A wrapper whose only content is one repeated field collapses
            // into a listing addressed through both segments.
            if let [inner] = element.attributes.as_slice() {
                if inner.kind == PrototypeKind::Listing {
                    return Some(PropertyKind::Listing {
                        element: Self::element_of(parser, inner)?,
                        uri_segment: format!("{}/{}", proto.name, inner.name),
                        secondary_lookup: Self::lookup_for(parser, inner),
                    });
                }
            }
            return Some(PropertyKind::SubObject {
                xsi_type: XsiType::from(parser.xsi_type_registration(element)),
            });
        }

        match proto.type_.as_deref() {
            Some(t) => Some(PropertyKind::SubObject {
                xsi_type: resolve_type_ref(parser, t),
            }),
            None => {
                warn!(
                    class = %desc.name,
                    field = %proto.name,
                    "nested field has neither a type nor a body, treating as string"
                );
                Some(PropertyKind::Scalar {
                    type_: ScalarType::String,
                    restrictions: proto.restrictions.clone(),
                })
            }
        }
    }

    fn element_of(parser: &SchemaParser, proto: &AttributePrototype) -> Option<ListingElement> {
        if let Some(t) = proto.type_.as_deref() {
            if t.starts_with("xs:") {
                return Some(ListingElement::Scalar(ScalarType::from_xs(t)));
            }
            return Some(ListingElement::Class(resolve_type_ref(parser, t)));
        }
        if let Some(element_class) = &proto.element_class {
            let element = parser.descriptor(element_class)?;
            return Some(ListingElement::Class(XsiType::from(
                parser.xsi_type_registration(element),
            )));
        }
        // Nothing to go on; repeated opaque values.
        Some(ListingElement::Scalar(ScalarType::String))
    }

    /// The lookup field of a listing's element class, decided from the
    /// curated table first and the element's display identifier second. The
    /// element may not be registered yet, so this works off descriptors.
    fn lookup_for(parser: &SchemaParser, proto: &AttributePrototype) -> Option<String> {
        let element_xsi = match Self::element_of(parser, proto)? {
            ListingElement::Class(xsi) => xsi,
            ListingElement::Scalar(_) => return None,
        };
        if let Some(field) = constants::lookup(SECONDARY_LOOKUP_FIELDS, element_xsi.as_str()) {
            return Some(field.to_string());
        }
        parser
            .descriptor(element_xsi.local())
            .and_then(|d| d.display_identifier.clone())
    }
}

/// Resolve a type token from a schema document (`xnat:subjectData`,
/// `subjectData`) to a registration identifier.
fn resolve_type_ref(parser: &SchemaParser, token: &str) -> XsiType {
    let local = token.split_once(':').map(|(_, l)| l).unwrap_or(token);
    if let Some(desc) = parser.descriptor(local) {
        return XsiType::from(parser.xsi_type_registration(desc));
    }
    if token.contains(':') {
        XsiType::from(token)
    } else {
        XsiType::from(format!("xnat:{token}"))
    }
}

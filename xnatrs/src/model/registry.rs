//! The type registry: xsi identifier -> class spec. Owned by the session,
//! never global, so two sessions against servers with different schema
//! extensions never see each other's classes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::constants::{self, FIELD_HINTS, SECONDARY_LOOKUP_FIELDS};
use crate::errors::{SchemaError, XnatError};
use crate::model::spec::ClassSpec;
use crate::types::XsiType;

#[derive(Debug, Default)]
pub struct TypeRegistry {
    specs: HashMap<XsiType, Arc<ClassSpec>>,
    /// Descriptor names the synthesizer could not resolve; kept for
    /// diagnostics, absent from lookup.
    unresolved: Vec<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register(&mut self, spec: ClassSpec) -> Result<Arc<ClassSpec>, SchemaError> {
        if self.specs.contains_key(&spec.xsi_type) {
            return Err(SchemaError::DuplicateType(spec.xsi_type.to_string()));
        }
        debug!(class = %spec.name, xsi_type = %spec.xsi_type, "registering class");
        let spec = Arc::new(spec);
        self.specs.insert(spec.xsi_type.clone(), spec.clone());
        Ok(spec)
    }

    pub fn resolve(&self, xsi_type: &XsiType) -> Option<Arc<ClassSpec>> {
        self.specs.get(xsi_type).cloned()
    }

    /// Like [resolve](Self::resolve) but an unregistered identifier is the
    /// caller's error, not an absence.
    pub fn require(&self, xsi_type: &XsiType) -> Result<Arc<ClassSpec>, XnatError> {
        self.resolve(xsi_type)
            .ok_or_else(|| XnatError::UnknownType(xsi_type.to_string()))
    }

    /// Walk the base chain of `child` looking for `ancestor`. A class is its
    /// own ancestor.
    pub fn is_subclass(&self, child: &XsiType, ancestor: &XsiType) -> bool {
        let mut current = Some(child.clone());
        while let Some(xsi) = current {
            if &xsi == ancestor {
                return true;
            }
            current = self.resolve(&xsi).and_then(|spec| spec.base.clone());
        }
        false
    }

    /// The human-friendly lookup field for a class: the curated table first,
    /// then the schema's display identifier, walking up the base chain.
    pub fn secondary_lookup(&self, xsi_type: &XsiType) -> Option<String> {
        let mut current = Some(xsi_type.clone());
        while let Some(xsi) = current {
            if let Some(field) = constants::lookup(SECONDARY_LOOKUP_FIELDS, xsi.as_str()) {
                return Some(field.to_string());
            }
            let spec = self.resolve(&xsi)?;
            if let Some(display) = &spec.display_identifier {
                return Some(display.clone());
            }
            current = spec.base.clone();
        }
        None
    }

    /// The listing field instances of a class are reachable through on their
    /// containing object, walking up the base chain for derived types.
    pub fn rest_listing(&self, xsi_type: &XsiType) -> Option<&'static str> {
        let mut current = Some(xsi_type.clone());
        while let Some(xsi) = current {
            if let Some(field) = constants::lookup(FIELD_HINTS, xsi.as_str()) {
                return Some(field);
            }
            current = self.resolve(&xsi).and_then(|spec| spec.base.clone());
        }
        None
    }

    pub fn set_unresolved(&mut self, names: Vec<String>) {
        self.unresolved = names;
    }

    /// Names of descriptors that were parsed but could not be generated.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClassSpec>> {
        self.specs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::ObjectKind;

    fn spec(name: &str, xsi: &str, base: Option<&str>) -> ClassSpec {
        ClassSpec {
            name: name.to_string(),
            xsi_type: XsiType::from(xsi),
            base: base.map(XsiType::from),
            kind: ObjectKind::Object,
            abstract_: false,
            field_name: None,
            display_identifier: None,
            properties: Vec::new(),
        }
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut registry = TypeRegistry::new();
        registry.register(spec("ProjectData", "xnat:projectData", None)).unwrap();
        let result = registry.register(spec("ProjectData2", "xnat:projectData", None));
        assert!(matches!(result, Err(SchemaError::DuplicateType(_))));
    }

    #[test]
    fn subclass_walks_the_base_chain() {
        let mut registry = TypeRegistry::new();
        registry.register(spec("ExperimentData", "xnat:experimentData", None)).unwrap();
        registry
            .register(spec("ImageSessionData", "xnat:imageSessionData", Some("xnat:experimentData")))
            .unwrap();
        registry
            .register(spec("MrSessionData", "xnat:mrSessionData", Some("xnat:imageSessionData")))
            .unwrap();
        let mr = XsiType::from("xnat:mrSessionData");
        assert!(registry.is_subclass(&mr, &XsiType::from("xnat:experimentData")));
        assert!(registry.is_subclass(&mr, &mr));
        assert!(!registry.is_subclass(&XsiType::from("xnat:experimentData"), &mr));
    }

    #[test]
    fn secondary_lookup_prefers_table_then_display_identifier() {
        let mut registry = TypeRegistry::new();
        registry.register(spec("ProjectData", "xnat:projectData", None)).unwrap();
        let mut custom = spec("PetAcq", "ext:petAcquisition", None);
        custom.display_identifier = Some("tracer".to_string());
        registry.register(custom).unwrap();

        assert_eq!(
            registry.secondary_lookup(&XsiType::from("xnat:projectData")),
            Some("name".to_string())
        );
        assert_eq!(
            registry.secondary_lookup(&XsiType::from("ext:petAcquisition")),
            Some("tracer".to_string())
        );
        assert_eq!(registry.secondary_lookup(&XsiType::from("ext:unknown")), None);
    }

    #[test]
    fn rest_listing_inherits_through_bases() {
        let mut registry = TypeRegistry::new();
        registry.register(spec("ExperimentData", "xnat:experimentData", None)).unwrap();
        registry
            .register(spec("MrSessionData", "xnat:mrSessionData", Some("xnat:experimentData")))
            .unwrap();
        assert_eq!(
            registry.rest_listing(&XsiType::from("xnat:mrSessionData")),
            Some("experiments")
        );
        assert_eq!(registry.rest_listing(&XsiType::from("ext:unknown")), None);
    }

    #[test]
    fn secondary_lookup_inherits_through_bases() {
        let mut registry = TypeRegistry::new();
        registry.register(spec("ExperimentData", "xnat:experimentData", None)).unwrap();
        registry
            .register(spec("PetSessionData", "ext:petSessionData", Some("xnat:experimentData")))
            .unwrap();
        assert_eq!(
            registry.secondary_lookup(&XsiType::from("ext:petSessionData")),
            Some("label".to_string())
        );
    }
}

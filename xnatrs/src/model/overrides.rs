//! Hand-curated additions layered over the schema-derived classes.
//!
//! The schema describes document structure, not the REST surface: the
//! archive hierarchy (project -> subject -> experiment -> scan -> resource
//! -> file) is only reachable through listing endpoints the schema never
//! mentions. These overrides graft those listings onto the generated
//! classes, and supply the file class, which has no schema type at all.

use crate::convert::ScalarType;
use crate::model::spec::{ClassSpec, ObjectKind, Property};
use crate::types::XsiType;

/// Extra listing properties for a class, keyed by registration identifier.
/// Merged after schema-derived properties, so a curated listing wins over a
/// same-named document field.
pub fn listing_properties(xsi_type: &str) -> Vec<Property> {
    match xsi_type {
        "xnat:projectData" => vec![
            Property::listing("subjects", "subjects", "xnat:subjectData", Some("label")),
            Property::listing("experiments", "experiments", "xnat:experimentData", Some("label")),
            Property::listing("resources", "resources", "xnat:resourceCatalog", Some("label")),
            Property::listing("files", "files", "xnat:fileData", Some("name")),
        ],
        "xnat:subjectData" => vec![
            Property::listing("experiments", "experiments", "xnat:experimentData", Some("label")),
            Property::listing("resources", "resources", "xnat:resourceCatalog", Some("label")),
            Property::listing("files", "files", "xnat:fileData", Some("name")),
        ],
        "xnat:experimentData" => vec![
            Property::listing("resources", "resources", "xnat:resourceCatalog", Some("label")),
            Property::listing("files", "files", "xnat:fileData", Some("name")),
        ],
        "xnat:imageSessionData" => vec![
            Property::listing("scans", "scans", "xnat:imageScanData", Some("type")),
        ],
        "xnat:imageScanData" => vec![
            Property::listing("resources", "resources", "xnat:resourceCatalog", Some("label")),
            Property::listing("files", "files", "xnat:fileData", Some("name")),
        ],
        "xnat:abstractResource" => vec![
            Property::listing("files", "files", "xnat:fileData", Some("name")),
        ],
        _ => Vec::new(),
    }
}

/// Files live under resource catalogs but have no complexType in any
/// schema; the class is supplied here instead of being synthesized.
pub fn file_data_spec() -> ClassSpec {
    ClassSpec {
        name: "FileData".to_string(),
        xsi_type: XsiType::from("xnat:fileData"),
        base: None,
        kind: ObjectKind::Object,
        abstract_: false,
        field_name: None,
        display_identifier: Some("name".to_string()),
        properties: vec![
            Property::scalar("name", ScalarType::String),
            Property::scalar("size", ScalarType::Int),
            Property::scalar("path", ScalarType::String),
            Property::scalar("digest", ScalarType::String),
            Property::scalar("collection", ScalarType::String),
            Property::scalar("file_format", ScalarType::String),
            Property::scalar("file_content", ScalarType::String),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::PropertyKind;

    #[test]
    fn project_listings_carry_lookup_fields() {
        let props = listing_properties("xnat:projectData");
        let subjects = props.iter().find(|p| p.name == "subjects").unwrap();
        match &subjects.kind {
            PropertyKind::Listing { secondary_lookup, uri_segment, .. } => {
                assert_eq!(secondary_lookup.as_deref(), Some("label"));
                assert_eq!(uri_segment, "subjects");
            }
            other => panic!("expected listing, got {other:?}"),
        }
    }

    #[test]
    fn unknown_classes_get_no_overrides() {
        assert!(listing_properties("ext:petTracerData").is_empty());
    }
}

//! Curated knowledge about well-known XNAT types that is not derivable from
//! the schema alone.

/// Human-readable secondary keys per xsi type. Listings over these types are
/// indexable by this field besides the primary ID, and objects constructed
/// from listing rows get the field pre-seeded to avoid a round trip.
pub const SECONDARY_LOOKUP_FIELDS: &[(&str, &str)] = &[
    ("xnat:projectData", "name"),
    ("xnat:subjectData", "label"),
    ("xnat:experimentData", "label"),
    ("xnat:imageSessionData", "label"),
    ("xnat:imageScanData", "type"),
    ("xnat:abstractResource", "label"),
    ("xnat:resourceCatalog", "label"),
    ("xnat:fileData", "name"),
];

/// Wire types for nested-object fields whose type cannot be read from the
/// parent record, keyed by field name. Fallback only; data wins when fetched.
pub const TYPE_HINTS: &[(&str, &str)] = &[
    ("demographics", "xnat:demographicData"),
    ("investigator", "xnat:investigatorData"),
    ("metadata", "xnat:subjectMetadata"),
    ("pi", "xnat:investigatorData"),
    ("studyprotocol", "xnat:studyProtocol"),
    ("validation", "xnat:validationData"),
    ("baseimage", "xnat:abstractResource"),
];

/// REST collection field under which instances of a type are listed on their
/// parent, for types whose listing route is not simply the field name.
pub const FIELD_HINTS: &[(&str, &str)] = &[
    ("xnat:projectData", "projects"),
    ("xnat:subjectData", "subjects"),
    ("xnat:experimentData", "experiments"),
    ("xnat:imageScanData", "scans"),
    ("xnat:abstractResource", "resources"),
    ("xnat:fileData", "files"),
];

/// Iteration cap for the topological emission loop. A full scan that visits
/// nothing new ends the loop earlier; the cap only guards against pathological
/// descriptor sets.
pub const TOPO_ITERATION_CAP: usize = 250;

pub(crate) fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

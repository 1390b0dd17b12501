//! Dual-keyed collections. A listing resolves its rows once, builds two maps
//! over the same objects (server ID and human-friendly key), and serves
//! lookups by either. Some server endpoints return rows in degenerate shapes;
//! those are repaired here before any object is created.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::XnatError;
use crate::object::{create_object, JsonMap, XnatObject};
use crate::session::{SessionHandle, SessionInner};
use crate::types::{DataUri, XsiType};

#[derive(Clone)]
pub struct XnatListing {
    inner: Rc<ListingInner>,
}

struct ListingInner {
    session: SessionHandle,
    uri: DataUri,
    element_xsi: Option<XsiType>,
    secondary_lookup: Option<String>,
    filters: Vec<(String, String)>,
    cache: RefCell<Option<ListingData>>,
}

struct ListingData {
    order: Vec<XnatObject>,
    by_id: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

/// One row after shape repair: enough to key it and build its object.
#[derive(Debug, PartialEq)]
struct Row {
    id: String,
    uri: String,
    key: Option<String>,
    xsi_type: Option<String>,
    fields: JsonMap,
}

impl XnatListing {
    pub(crate) fn new(
        session: &Rc<SessionInner>,
        uri: DataUri,
        element_xsi: Option<XsiType>,
        secondary_lookup: Option<String>,
        filters: Vec<(String, String)>,
    ) -> XnatListing {
        XnatListing {
            inner: Rc::new(ListingInner {
                session: SessionHandle::downgrade(session),
                uri,
                element_xsi,
                secondary_lookup,
                filters,
                cache: RefCell::new(None),
            }),
        }
    }

    pub fn uri(&self) -> &DataUri {
        &self.inner.uri
    }

    pub fn filters(&self) -> &[(String, String)] {
        &self.inner.filters
    }

    /// Look a member up by server ID first, then by the secondary key.
    pub fn get(&self, key: &str) -> Result<XnatObject, XnatError> {
        self.with_data(|data| {
            data.by_id
                .get(key)
                .or_else(|| data.by_key.get(key))
                .map(|&i| data.order[i].clone())
        })?
        .ok_or_else(|| XnatError::NotFound(key.to_string()))
    }

    /// Members in server order.
    pub fn values(&self) -> Result<Vec<XnatObject>, XnatError> {
        self.with_data(|data| data.order.clone())
    }

    /// Server IDs in server order.
    pub fn keys(&self) -> Result<Vec<String>, XnatError> {
        self.with_data(|data| {
            let mut keys: Vec<(usize, String)> =
                data.by_id.iter().map(|(k, &i)| (i, k.clone())).collect();
            keys.sort_by_key(|(i, _)| *i);
            keys.into_iter().map(|(_, k)| k).collect()
        })
    }

    pub fn len(&self) -> Result<usize, XnatError> {
        self.with_data(|data| data.order.len())
    }

    pub fn is_empty(&self) -> Result<bool, XnatError> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, key: &str) -> Result<bool, XnatError> {
        self.with_data(|data| data.by_id.contains_key(key) || data.by_key.contains_key(key))
    }

    /// A new listing over the same endpoint with extra filters. Redefining
    /// an existing filter to a different value is a conflict, never a silent
    /// override.
    pub fn filter(&self, filters: &[(&str, &str)]) -> Result<XnatListing, XnatError> {
        let merged = merge_filters(&self.inner.filters, filters)?;
        let session = self.inner.session.upgrade()?;
        Ok(XnatListing::new(
            &session,
            self.inner.uri.clone(),
            self.inner.element_xsi.clone(),
            self.inner.secondary_lookup.clone(),
            merged,
        ))
    }

    /// Fetch arbitrary columns for the members as raw rows. Always goes to
    /// the server; tabulation output is never cached.
    pub fn tabulate(&self, columns: &[&str]) -> Result<Vec<JsonMap>, XnatError> {
        let session = self.inner.session.upgrade()?;
        let columns = columns.join(",");
        let mut query: Vec<(&str, &str)> =
            vec![("format", "json"), ("columns", columns.as_str())];
        for (key, value) in &self.inner.filters {
            query.push((key.as_str(), value.as_str()));
        }
        let json = session.get_json(&self.inner.uri, &query)?;
        Ok(result_rows(&json, &self.inner.uri)?
            .into_iter()
            .filter(|row| passes_glob_filters(row, &self.inner.filters))
            .collect())
    }

    pub fn clearcache(&self) {
        *self.inner.cache.borrow_mut() = None;
    }

    fn with_data<R>(&self, f: impl FnOnce(&ListingData) -> R) -> Result<R, XnatError> {
        let session = self.inner.session.upgrade()?;
        let needs_fetch =
            self.inner.cache.borrow().is_none() || !session.caching();
        if needs_fetch {
            let data = self.fetch(&session)?;
            *self.inner.cache.borrow_mut() = Some(data);
        }
        let cache = self.inner.cache.borrow();
        Ok(f(cache.as_ref().expect("listing cache filled above")))
    }

    /// One request resolves the whole listing: both key maps are built from
    /// the same response.
    fn fetch(&self, session: &Rc<SessionInner>) -> Result<ListingData, XnatError> {
        let mut columns = vec!["ID", "URI"];
        if let Some(secondary) = &self.inner.secondary_lookup {
            columns.push(secondary);
        }
        // Only experiment listings are heterogeneous; for those the element
        // class of each row has to come back with the data.
        let experiment = XsiType::from("xnat:experimentData");
        let polymorphic = self
            .inner
            .element_xsi
            .as_ref()
            .is_some_and(|xsi| session.registry().is_subclass(xsi, &experiment));
        if polymorphic {
            columns.push("xsiType");
        }
        let columns = columns.join(",");

        let mut query: Vec<(&str, &str)> =
            vec![("format", "json"), ("columns", columns.as_str())];
        for (key, value) in &self.inner.filters {
            query.push((key.as_str(), value.as_str()));
        }
        let json = session.get_json(&self.inner.uri, &query)?;

        let mut order = Vec::new();
        let mut by_id = HashMap::new();
        let mut by_key = HashMap::new();
        for fields in result_rows(&json, &self.inner.uri)? {
            if !passes_glob_filters(&fields, &self.inner.filters) {
                continue;
            }
            let Some(row) = repair_row(&self.inner.uri, self.inner.secondary_lookup.as_deref(), fields)
            else {
                warn!(uri = %self.inner.uri, "dropping listing row with no usable identifier");
                continue;
            };
            let xsi = row
                .xsi_type
                .as_deref()
                .map(XsiType::from)
                .or_else(|| self.inner.element_xsi.clone());
            let object = create_object(
                session,
                &DataUri::from(row.uri),
                xsi.as_ref(),
                Some(row.fields),
            )?;
            let index = order.len();
            order.push(object);
            by_id.insert(row.id, index);
            if let Some(key) = row.key {
                by_key.insert(key, index);
            }
        }
        debug!(uri = %self.inner.uri, rows = order.len(), "listing resolved");
        Ok(ListingData { order, by_id, by_key })
    }
}

impl std::fmt::Debug for XnatListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<XnatListing {}>", self.inner.uri)
    }
}

pub(crate) fn result_rows(json: &Value, uri: &DataUri) -> Result<Vec<JsonMap>, XnatError> {
    json.get("ResultSet")
        .and_then(|r| r.get("Result"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        })
        .ok_or_else(|| XnatError::Json(uri.to_string()))
}

fn field<'a>(row: &'a JsonMap, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Normalize a result row. Two degenerate shapes occur in the wild:
///
/// * file rows identify themselves by `Name` and their catalog's `cat_ID`,
///   not by an `ID` column;
/// * resource rows may come back without a `URI`, and carry their numeric
///   identifier in `xnat_abstractresource_id`.
fn repair_row(listing_uri: &DataUri, secondary_lookup: Option<&str>, fields: JsonMap) -> Option<Row> {
    let xsi_type = field(&fields, "xsiType").map(str::to_string);

    // File shape.
    if let (Some(name), Some(cat_id)) = (field(&fields, "Name"), field(&fields, "cat_ID")) {
        let uri = field(&fields, "URI")
            .map(str::to_string)
            .unwrap_or_else(|| listing_uri.child(name).to_string());
        return Some(Row {
            id: format!("{cat_id}/files/{name}"),
            uri,
            key: Some(name.to_string()),
            xsi_type,
            fields,
        });
    }

    let key = secondary_lookup
        .and_then(|lookup| field(&fields, lookup))
        .map(str::to_string);

    // Resource shape.
    if field(&fields, "URI").is_none() {
        let id = field(&fields, "xnat_abstractresource_id")?.to_string();
        let uri = listing_uri.child(key.as_deref()?).to_string();
        return Some(Row { id, uri, key, xsi_type, fields });
    }

    let id = field(&fields, "ID")
        .or_else(|| field(&fields, "xnat_abstractresource_id"))?
        .to_string();
    let uri = field(&fields, "URI")?.to_string();
    Some(Row { id, uri, key, xsi_type, fields })
}

pub(crate) fn merge_filters(
    existing: &[(String, String)],
    new: &[(&str, &str)],
) -> Result<Vec<(String, String)>, XnatError> {
    let mut merged = existing.to_vec();
    for (key, value) in new {
        match merged.iter().find(|(k, _)| k == key) {
            Some((_, old)) if old != value => {
                return Err(XnatError::FilterConflict {
                    key: key.to_string(),
                    old: old.clone(),
                    new: value.to_string(),
                });
            }
            Some(_) => {}
            None => merged.push((key.to_string(), value.to_string())),
        }
    }
    Ok(merged)
}

/// Not every endpoint honors every filter criterion, so all of them are
/// re-applied to the rows the server returned. A pattern without wildcards
/// degenerates to an equality check.
fn passes_glob_filters(row: &JsonMap, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(key, pattern)| {
        match field(row, key) {
            Some(value) => glob_match(pattern, value),
            // The column was not part of the result; nothing to re-check.
            None => true,
        }
    })
}

/// Shell-style matching with `*` and `?`, iterative with single-star
/// backtracking.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use serde_json::json;

    #[rstest]
    #[case("*", "anything", true)]
    #[case("sub-*", "sub-001", true)]
    #[case("sub-*", "ses-001", false)]
    #[case("sub-???", "sub-001", true)]
    #[case("sub-???", "sub-1", false)]
    #[case("*_T1w", "sub-01_T1w", true)]
    #[case("*_T1w", "sub-01_T2w", false)]
    #[case("a*b*c", "axxbyyc", true)]
    #[case("a*b*c", "axxbyy", false)]
    #[case("", "", true)]
    #[case("", "x", false)]
    fn glob_matching(#[case] pattern: &str, #[case] text: &str, #[case] expected: bool) {
        assert_eq!(glob_match(pattern, text), expected);
    }

    #[test]
    fn merging_filters_rejects_contradictions() {
        let existing = vec![("group".to_string(), "control".to_string())];
        let merged = merge_filters(&existing, &[("gender", "female")]).unwrap();
        assert_eq!(merged.len(), 2);

        // Same value again is fine.
        assert!(merge_filters(&existing, &[("group", "control")]).is_ok());

        let err = merge_filters(&existing, &[("group", "patient")]).unwrap_err();
        assert!(matches!(err, XnatError::FilterConflict { .. }));
    }

    fn map(value: Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn normal_rows_pass_through() {
        let uri = DataUri::from("/data/archive/projects/P1/subjects");
        let row = repair_row(
            &uri,
            Some("label"),
            map(json!({"ID": "S0001", "URI": "/data/subjects/S0001", "label": "sub-01"})),
        )
        .unwrap();
        assert_eq!(row.id, "S0001");
        assert_eq!(row.uri, "/data/subjects/S0001");
        assert_eq!(row.key.as_deref(), Some("sub-01"));
    }

    #[test]
    fn resource_rows_without_uri_are_synthesized() {
        let uri = DataUri::from("/data/experiments/E1/resources");
        let row = repair_row(
            &uri,
            Some("label"),
            map(json!({"xnat_abstractresource_id": "17", "label": "DICOM"})),
        )
        .unwrap();
        assert_eq!(row.id, "17");
        assert_eq!(row.uri, "/data/experiments/E1/resources/DICOM");
        assert_eq!(row.key.as_deref(), Some("DICOM"));
    }

    #[test]
    fn file_rows_are_keyed_by_name_and_catalog() {
        let uri = DataUri::from("/data/experiments/E1/resources/17/files");
        let row = repair_row(
            &uri,
            Some("name"),
            map(json!({
                "Name": "scan.nii.gz",
                "cat_ID": "17",
                "URI": "/data/experiments/E1/resources/17/files/scan.nii.gz"
            })),
        )
        .unwrap();
        assert_eq!(row.id, "17/files/scan.nii.gz");
        assert_eq!(row.key.as_deref(), Some("scan.nii.gz"));
    }

    #[test]
    fn rows_without_any_identifier_are_dropped() {
        let uri = DataUri::from("/data/projects/P1/subjects");
        assert!(repair_row(&uri, Some("label"), map(json!({"label": "sub-01"}))).is_none());
    }

    #[test]
    fn rows_missing_the_secondary_value_keep_their_id() {
        let uri = DataUri::from("/data/projects/P1/subjects");
        let row = repair_row(
            &uri,
            Some("label"),
            map(json!({"ID": "S0002", "URI": "/data/subjects/S0002"})),
        )
        .unwrap();
        assert_eq!(row.id, "S0002");
        assert_eq!(row.key, None);
    }

    #[test]
    fn all_filters_reapply_to_rows() {
        let filters = vec![("label".to_string(), "sub-*".to_string())];
        assert!(passes_glob_filters(&map(json!({"label": "sub-01"})), &filters));
        assert!(!passes_glob_filters(&map(json!({"label": "ses-01"})), &filters));
        // Literal filters are equality checks; the server may have ignored
        // the criterion entirely.
        let literal = vec![("label".to_string(), "sub-01".to_string())];
        assert!(passes_glob_filters(&map(json!({"label": "sub-01"})), &literal));
        assert!(!passes_glob_filters(&map(json!({"label": "anything"})), &literal));
        // A column absent from the result cannot be re-checked.
        assert!(passes_glob_filters(&map(json!({"ID": "S1"})), &literal));
    }
}

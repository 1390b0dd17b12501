//! The object runtime: one handle type, [XnatObject], driven entirely by the
//! class spec it carries. There is no per-class struct; what a "subject" or
//! "scan" can do is decided by the property table of its spec.
//!
//! Handles are cheap to clone and share one lazily-filled cache. The session
//! keeps a weak registry of live objects keyed by URI and field path, so two
//! lookups that land on the same resource yield the same instance.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::{self, TYPE_HINTS};
use crate::convert::{convert_from, convert_to, FieldValue, ScalarType};
use crate::errors::XnatError;
use crate::listing::XnatListing;
use crate::model::{ClassSpec, ListingElement, ObjectKind, PropertyKind};
use crate::schema::Restrictions;
use crate::session::{SessionHandle, SessionInner};
use crate::types::{DataUri, XsiType};

pub(crate) type JsonMap = Map<String, Value>;

const FILE_XSI: &str = "xnat:fileData";

#[derive(Clone)]
pub struct XnatObject {
    inner: Rc<ObjectInner>,
}

/// Non-owning handle used by the session's object cache, so the cache never
/// keeps objects alive on its own.
pub(crate) struct WeakObject(std::rc::Weak<ObjectInner>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<XnatObject> {
        self.0.upgrade().map(|inner| XnatObject { inner })
    }
}

impl XnatObject {
    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.inner))
    }
}

struct ObjectInner {
    session: SessionHandle,
    uri: DataUri,
    spec: Arc<ClassSpec>,
    /// Enclosing object, for embedded sub-objects.
    owner: Option<XnatObject>,
    /// Field under the owner holding this sub-object.
    field_name: Option<String>,
    data: RefCell<Option<JsonMap>>,
    listings: RefCell<HashMap<String, XnatListing>>,
    /// Per-instance caching override; `None` follows the session setting.
    caching: Cell<Option<bool>>,
}

/// Factory for root objects. Goes through the session's weak object cache
/// first, so repeated lookups of the same URI share one instance.
pub(crate) fn create_object(
    session: &Rc<SessionInner>,
    uri: &DataUri,
    xsi_type: Option<&XsiType>,
    seed: Option<JsonMap>,
) -> Result<XnatObject, XnatError> {
    if let Some(existing) = session.cached_object(uri, None) {
        return Ok(existing);
    }
    let xsi = match xsi_type {
        Some(xsi) => xsi.clone(),
        None => determine_type(session, uri, seed.as_ref())?,
    };
    let spec = session.registry().require(&xsi)?;
    debug!(uri = %uri, class = %spec.name, "creating object");
    let object = XnatObject {
        inner: Rc::new(ObjectInner {
            session: SessionHandle::downgrade(session),
            uri: uri.clone(),
            spec,
            owner: None,
            field_name: None,
            data: RefCell::new(seed),
            listings: RefCell::new(HashMap::new()),
            caching: Cell::new(None),
        }),
    };
    session.cache_object(uri, None, &object);
    Ok(object)
}

/// Type discovery for a URI with no declared class: the seed row first, then
/// the fetched document metadata, then the static hint table for the final
/// URI segment.
fn determine_type(
    session: &Rc<SessionInner>,
    uri: &DataUri,
    seed: Option<&JsonMap>,
) -> Result<XsiType, XnatError> {
    if let Some(xsi) = seed
        .and_then(|s| s.get("xsiType"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return Ok(XsiType::from(xsi));
    }
    let item = session.get_json(uri, &[("format", "json")])?;
    if let Some(xsi) = item
        .get("items")
        .and_then(|i| i.get(0))
        .and_then(|i| i.get("meta"))
        .and_then(|m| m.get("xsi:type"))
        .and_then(Value::as_str)
    {
        return Ok(XsiType::from(xsi));
    }
    let segment = uri.as_str().rsplit('/').next().unwrap_or_default();
    match constants::lookup(TYPE_HINTS, segment) {
        Some(hint) => Ok(XsiType::from(hint)),
        None => Err(XnatError::UndeterminedType(uri.to_string())),
    }
}

impl XnatObject {
    pub fn uri(&self) -> &DataUri {
        &self.inner.uri
    }

    pub fn xsi_type(&self) -> &XsiType {
        &self.inner.spec.xsi_type
    }

    pub fn class_name(&self) -> &str {
        &self.inner.spec.name
    }

    pub fn spec(&self) -> &ClassSpec {
        &self.inner.spec
    }

    /// Embedded sub-objects live inside an owner's document and have no URI
    /// of their own.
    pub fn is_sub_object(&self) -> bool {
        self.inner.owner.is_some() || self.inner.spec.kind == ObjectKind::SubObject
    }

    fn session(&self) -> Result<Rc<SessionInner>, XnatError> {
        self.inner.session.upgrade()
    }

    /// Override caching for this instance; `None` follows the session.
    pub fn set_caching(&self, caching: Option<bool>) {
        self.inner.caching.set(caching);
    }

    fn effective_caching(&self, session: &SessionInner) -> bool {
        self.inner.caching.get().unwrap_or_else(|| session.caching())
    }

    /// The raw field map of this object, fetched on first use.
    pub fn data(&self) -> Result<JsonMap, XnatError> {
        let session = self.session()?;
        if self.effective_caching(&session) {
            if let Some(map) = self.inner.data.borrow().as_ref() {
                return Ok(map.clone());
            }
        }
        let map = self.fetch_data(&session)?;
        *self.inner.data.borrow_mut() = Some(map.clone());
        Ok(map)
    }

    /// The complete item document, metadata included. Never cached.
    pub fn fulldata(&self) -> Result<Value, XnatError> {
        let session = self.session()?;
        let json = session.get_json(&self.inner.uri, &[("format", "json")])?;
        json.get("items")
            .and_then(|i| i.get(0))
            .cloned()
            .ok_or_else(|| XnatError::Json(self.inner.uri.to_string()))
    }

    fn fetch_data(&self, session: &Rc<SessionInner>) -> Result<JsonMap, XnatError> {
        if let Some(owner) = &self.inner.owner {
            // Sub-objects slice their fields out of the owner's document.
            let mut current = Value::Object(owner.data()?);
            for segment in self.inner.field_name.as_deref().unwrap_or_default().split('/') {
                current = current.get(segment).cloned().unwrap_or(Value::Null);
            }
            return Ok(current.as_object().cloned().unwrap_or_default());
        }
        if self.inner.spec.xsi_type.as_str() == FILE_XSI {
            // A file URI serves content, not metadata; all we know about a
            // file comes from the listing row that produced it.
            return Ok(self.inner.data.borrow().clone().unwrap_or_default());
        }
        let item = self.fulldata()?;
        item.get("data_fields")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| XnatError::Json(self.inner.uri.to_string()))
    }

    /// Read a scalar field, converted to its declared primitive type.
    /// `Ok(None)` means the field is declared but the server holds no value.
    pub fn get(&self, name: &str) -> Result<Option<FieldValue>, XnatError> {
        let prop = self.property(name)?;
        match &prop.kind {
            PropertyKind::Scalar { type_, .. } => {
                let type_ = *type_;
                json_to_field(self.data()?.get(name), type_)
            }
            PropertyKind::Constant { value } => Ok(Some(FieldValue::String(value.clone()))),
            PropertyKind::SubObject { .. } => Err(shape_error(name, "an object field, use get_object")),
            PropertyKind::Listing { element: ListingElement::Scalar(_), .. } => {
                Err(shape_error(name, "a repeated value field, read it via data()"))
            }
            PropertyKind::Listing { .. } => Err(shape_error(name, "a listing field, use listing()")),
        }
    }

    /// Read a scalar field under an explicit primitive type instead of the
    /// declared one. Useful when a server stores, say, timestamps in a field
    /// the schema types as a plain string.
    pub fn get_as(&self, name: &str, type_: ScalarType) -> Result<Option<FieldValue>, XnatError> {
        let prop = self.property(name)?;
        match &prop.kind {
            PropertyKind::Scalar { .. } => json_to_field(self.data()?.get(name), type_),
            PropertyKind::Constant { value } => convert_to(value, type_).map(Some),
            _ => Err(shape_error(name, "not a scalar field")),
        }
    }

    /// Write a scalar field. Restrictions are checked locally; nothing goes
    /// on the wire for an invalid value.
    pub fn set(&self, name: &str, value: impl Into<FieldValue>) -> Result<(), XnatError> {
        let value = value.into();
        let prop = self.property(name)?;
        let (type_, restrictions) = match &prop.kind {
            PropertyKind::Scalar { type_, restrictions } => (*type_, restrictions.clone()),
            PropertyKind::Constant { .. } => {
                return Err(shape_error(name, "fixed by the schema and read-only"))
            }
            _ => return Err(shape_error(name, "not a scalar field")),
        };
        let raw = convert_from(&value, type_)?;
        validate(name, &restrictions, &value, &raw)?;
        self.set_raw(name, &raw)
    }

    fn set_raw(&self, key: &str, raw: &str) -> Result<(), XnatError> {
        match &self.inner.owner {
            Some(owner) => {
                // Writes delegate upward, prefixing the field path at each
                // level; only the root object talks to the server.
                let field = self.inner.field_name.as_deref().unwrap_or_default();
                owner.set_raw(&format!("{field}/{key}"), raw)?;
            }
            None => {
                let session = self.session()?;
                session.put(&self.inner.uri, &[(key, raw)])?;
            }
        }
        self.clearcache();
        Ok(())
    }

    /// Resolve an embedded object field. Fields absent from the class spec
    /// fall back to the static hint table, which covers structures the
    /// schemas leave underspecified.
    pub fn get_object(&self, name: &str) -> Result<XnatObject, XnatError> {
        let session = self.session()?;
        let xsi = match self.inner.spec.property(name).map(|p| &p.kind) {
            Some(PropertyKind::SubObject { xsi_type }) => xsi_type.clone(),
            Some(_) => return Err(shape_error(name, "not an object field")),
            None => match constants::lookup(TYPE_HINTS, name) {
                Some(hint) => XsiType::from(hint),
                None => {
                    return Err(XnatError::NoSuchProperty {
                        class: self.inner.spec.name.clone(),
                        field: name.to_string(),
                    })
                }
            },
        };

        let path = match self.full_path() {
            Some(prefix) => format!("{prefix}/{name}"),
            None => name.to_string(),
        };
        if let Some(existing) = session.cached_object(&self.inner.uri, Some(&path)) {
            return Ok(existing);
        }
        let spec = session.registry().require(&xsi)?;
        let object = XnatObject {
            inner: Rc::new(ObjectInner {
                session: SessionHandle::downgrade(&session),
                uri: self.inner.uri.clone(),
                spec,
                owner: Some(self.clone()),
                field_name: Some(name.to_string()),
                data: RefCell::new(None),
                listings: RefCell::new(HashMap::new()),
                caching: Cell::new(None),
            }),
        };
        session.cache_object(&self.inner.uri, Some(&path), &object);
        Ok(object)
    }

    /// Resolve a listing field (subjects of a project, files of a resource).
    pub fn listing(&self, name: &str) -> Result<XnatListing, XnatError> {
        let session = self.session()?;
        if self.effective_caching(&session) {
            if let Some(listing) = self.inner.listings.borrow().get(name) {
                return Ok(listing.clone());
            }
        }
        let prop = self.property(name)?;
        let PropertyKind::Listing { element, uri_segment, secondary_lookup } = &prop.kind else {
            return Err(shape_error(name, "not a listing field"));
        };
        let ListingElement::Class(element_xsi) = element else {
            return Err(shape_error(name, "a repeated value field, read it via data()"));
        };
        let secondary = secondary_lookup
            .clone()
            .or_else(|| session.registry().secondary_lookup(element_xsi));
        let listing = XnatListing::new(
            &session,
            self.inner.uri.child(uri_segment),
            Some(element_xsi.clone()),
            secondary,
            Vec::new(),
        );
        self.inner
            .listings
            .borrow_mut()
            .insert(name.to_string(), listing.clone());
        Ok(listing)
    }

    /// Server identifier of this object. Sub-objects have no ID of their
    /// own and derive one from their owner.
    pub fn id(&self) -> Result<String, XnatError> {
        if let Some(Value::String(id)) = self.data()?.get("ID") {
            return Ok(id.clone());
        }
        if let (Some(owner), Some(field)) = (&self.inner.owner, &self.inner.field_name) {
            return Ok(format!("{}/{}", owner.id()?, field));
        }
        Ok(self
            .inner
            .uri
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string())
    }

    pub fn clearcache(&self) {
        *self.inner.data.borrow_mut() = None;
        self.inner.listings.borrow_mut().clear();
    }

    /// Delete this resource on the server. The handle itself stays valid in
    /// memory but is evicted from the session cache, so later lookups of the
    /// URI see the server's view.
    pub fn delete(&self, remove_files: bool) -> Result<(), XnatError> {
        if self.inner.owner.is_some() {
            return Err(shape_error("delete", "embedded objects cannot be deleted directly"));
        }
        let session = self.session()?;
        let query: &[(&str, &str)] = if remove_files {
            &[("removeFiles", "true")]
        } else {
            &[]
        };
        session.delete(&self.inner.uri, query)?;
        session.evict_object(&self.inner.uri, None);
        self.clearcache();
        Ok(())
    }

    /// Stream this object's content into `dest`. File objects serve their
    /// bytes directly; anything else is served as a zip archive.
    pub fn download(&self, dest: &mut dyn Write) -> Result<u64, XnatError> {
        let session = self.session()?;
        if self.inner.spec.xsi_type.as_str() == FILE_XSI {
            session.download_to(&self.inner.uri, &[], dest)
        } else {
            session.download_to(&self.inner.uri.child("files"), &[("format", "zip")], dest)
        }
    }

    fn property(&self, name: &str) -> Result<crate::model::Property, XnatError> {
        self.inner
            .spec
            .property(name)
            .cloned()
            .ok_or_else(|| XnatError::NoSuchProperty {
                class: self.inner.spec.name.clone(),
                field: name.to_string(),
            })
    }

    fn full_path(&self) -> Option<String> {
        match (&self.inner.owner, &self.inner.field_name) {
            (Some(owner), Some(field)) => Some(match owner.full_path() {
                Some(prefix) => format!("{prefix}/{field}"),
                None => field.clone(),
            }),
            _ => None,
        }
    }
}

impl PartialEq for XnatObject {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for XnatObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.inner.spec.name, self.inner.uri)
    }
}

fn shape_error(field: &str, message: &str) -> XnatError {
    XnatError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn json_to_field(value: Option<&Value>, type_: ScalarType) -> Result<Option<FieldValue>, XnatError> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    match value {
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => convert_to(s, type_).map(Some),
        Value::Bool(b) => Ok(Some(FieldValue::Bool(*b))),
        Value::Number(n) => match type_ {
            ScalarType::Int => Ok(n.as_i64().map(FieldValue::Int)),
            ScalarType::Float => Ok(n.as_f64().map(FieldValue::Float)),
            _ => convert_to(&n.to_string(), type_).map(Some),
        },
        other => Err(XnatError::Conversion {
            value: other.to_string(),
            type_name: type_.name().to_string(),
        }),
    }
}

fn validate(
    field: &str,
    restrictions: &Restrictions,
    value: &FieldValue,
    raw: &str,
) -> Result<(), XnatError> {
    let fail = |message: String| {
        Err(XnatError::Validation {
            field: field.to_string(),
            message,
        })
    };
    if let Some(values) = &restrictions.enum_values {
        if !values.iter().any(|v| v == raw) {
            return fail(format!("must be one of {values:?}, got {raw}"));
        }
    }
    let numeric = match value {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        FieldValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if let (Some(min), Some(n)) = (restrictions.min, numeric) {
        if n < min {
            return fail(format!("must be at least {min}, got {n}"));
        }
    }
    if let (Some(max), Some(n)) = (restrictions.max, numeric) {
        if n > max {
            return fail(format!("must be at most {max}, got {n}"));
        }
    }
    let length = raw.chars().count();
    if let Some(min_length) = restrictions.min_length {
        if length < min_length {
            return fail(format!("must be at least {min_length} characters"));
        }
    }
    if let Some(max_length) = restrictions.max_length {
        if length > max_length {
            return fail(format!("must be at most {max_length} characters"));
        }
    }
    Ok(())
}

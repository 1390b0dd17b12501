//! The session: connects, ingests the server's schemas into a type registry,
//! and is the root of every object and listing handle.
//!
//! The whole runtime is single-threaded by construction. Objects share state
//! through `Rc`/`RefCell` and hold only weak references back to the session,
//! so dropping the session invalidates outstanding handles instead of
//! leaking them; none of the handle types are `Send`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::XnatError;
use crate::listing::XnatListing;
use crate::model::{ClassSynthesizer, TypeRegistry};
use crate::object::{create_object, WeakObject, XnatObject};
use crate::schema::{find_schema_uris, SchemaParser};
use crate::transport::{HttpTransport, Method, Request, Response, Transport};
use crate::types::{DataUri, XsiType};

/// Servers expire idle tokens after 15 minutes; the heartbeat stays under.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(14 * 60);

/// Root archive collections; the REST segment of each comes from the
/// registry's collection-field hints at listing time.
const ARCHIVE_ROOTS: &[(&str, &str)] = &[
    ("projects", "xnat:projectData"),
    ("subjects", "xnat:subjectData"),
    ("experiments", "xnat:experimentData"),
];

pub struct XnatSession {
    inner: Rc<SessionInner>,
    keepalive: Option<Keepalive>,
}

pub(crate) struct SessionInner {
    server: String,
    transport: Box<dyn Transport>,
    registry: TypeRegistry,
    schemas: Vec<String>,
    caching: Cell<bool>,
    closed: Cell<bool>,
    object_cache: RefCell<HashMap<(DataUri, Option<String>), WeakObject>>,
    listings: RefCell<HashMap<String, XnatListing>>,
}

/// Weak reference from objects and listings back to their session. An
/// upgrade after the session is gone is the caller's error, reported as
/// [XnatError::SessionClosed].
#[derive(Clone)]
pub(crate) struct SessionHandle(Weak<SessionInner>);

impl SessionHandle {
    pub(crate) fn downgrade(inner: &Rc<SessionInner>) -> Self {
        SessionHandle(Rc::downgrade(inner))
    }

    pub(crate) fn upgrade(&self) -> Result<Rc<SessionInner>, XnatError> {
        self.0.upgrade().ok_or(XnatError::SessionClosed)
    }
}

impl XnatSession {
    /// Connect with basic authentication, ingest the server's schemas and
    /// build the class registry. A heartbeat thread on a clone of the same
    /// transport keeps the session token alive until the session is
    /// disconnected or dropped.
    pub fn connect(
        server: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<XnatSession, XnatError> {
        let transport = HttpTransport::new(user, password)?;
        let heartbeat = transport.clone();
        let mut session = Self::with_transport(server, Box::new(transport))?;
        session.keepalive = Some(Keepalive::start(session.inner.server.clone(), heartbeat)?);
        Ok(session)
    }

    /// Connect over a caller-supplied transport. No heartbeat is started;
    /// the transport owns its own liveness.
    pub fn with_transport(
        server: &str,
        transport: Box<dyn Transport>,
    ) -> Result<XnatSession, XnatError> {
        let server = server.trim_end_matches('/').to_string();
        let mut parser = SchemaParser::new();
        for (index, (uri, body)) in fetch_schemas(transport.as_ref(), &server)?.iter().enumerate() {
            check_schema_body(body)?;
            match parser.parse_string(body, uri) {
                Ok(()) => debug!(uri, "schema ingested"),
                // The core schema has to parse; extension schemas that do
                // not are skipped so one broken plugin cannot block the
                // whole connection.
                Err(e) if index == 0 => return Err(e.into()),
                Err(e) => warn!(uri, error = %e, "skipping unparsable extension schema"),
            }
        }
        let schemas = parser.schemas().to_vec();
        let registry = ClassSynthesizer::build(&parser)?;
        info!(server = %server, classes = registry.len(), "connected");

        Ok(XnatSession {
            inner: Rc::new(SessionInner {
                server,
                transport,
                registry,
                schemas,
                caching: Cell::new(true),
                closed: Cell::new(false),
                object_cache: RefCell::new(HashMap::new()),
                listings: RefCell::new(HashMap::new()),
            }),
            keepalive: None,
        })
    }

    pub fn server(&self) -> &str {
        &self.inner.server
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// URIs of the schema documents this session was built from.
    pub fn schemas(&self) -> &[String] {
        &self.inner.schemas
    }

    pub fn caching(&self) -> bool {
        self.inner.caching.get()
    }

    pub fn set_caching(&self, caching: bool) {
        self.inner.caching.set(caching);
    }

    /// Drop all cached data: session listings, and the field caches of every
    /// live object.
    pub fn clearcache(&self) {
        self.inner.listings.borrow_mut().clear();
        let mut cache = self.inner.object_cache.borrow_mut();
        cache.retain(|_, weak| match weak.upgrade() {
            Some(object) => {
                object.clearcache();
                true
            }
            None => false,
        });
    }

    /// Resolve a URI to an object, discovering its type from the server.
    pub fn get_object(&self, uri: &str) -> Result<XnatObject, XnatError> {
        create_object(&self.inner, &DataUri::from(uri), None, None)
    }

    /// Resolve a URI to an object of a known class, skipping discovery.
    pub fn get_object_as(&self, uri: &str, xsi_type: &XsiType) -> Result<XnatObject, XnatError> {
        create_object(&self.inner, &DataUri::from(uri), Some(xsi_type), None)
    }

    pub fn projects(&self) -> XnatListing {
        self.archive_listing("projects")
    }

    pub fn subjects(&self) -> XnatListing {
        self.archive_listing("subjects")
    }

    pub fn experiments(&self) -> XnatListing {
        self.archive_listing("experiments")
    }

    fn archive_listing(&self, name: &str) -> XnatListing {
        if self.caching() {
            if let Some(listing) = self.inner.listings.borrow().get(name) {
                return listing.clone();
            }
        }
        let (_, xsi) = ARCHIVE_ROOTS
            .iter()
            .find(|(n, _)| *n == name)
            .expect("archive root names are static");
        let xsi = XsiType::from(*xsi);
        let segment = self.inner.registry.rest_listing(&xsi).unwrap_or(name);
        let listing = XnatListing::new(
            &self.inner,
            DataUri::from(format!("/data/archive/{segment}")),
            Some(xsi.clone()),
            self.inner.registry.secondary_lookup(&xsi),
            Vec::new(),
        );
        self.inner
            .listings
            .borrow_mut()
            .insert(name.to_string(), listing.clone());
        listing
    }

    /// Raw GET against a rooted path; status and body checking included.
    pub fn get(&self, path: &str) -> Result<Response, XnatError> {
        self.inner.get(&DataUri::from(path), &[])
    }

    pub fn get_json(&self, path: &str) -> Result<Value, XnatError> {
        self.inner.get_json(&DataUri::from(path), &[("format", "json")])
    }

    pub fn put(&self, path: &str, query: &[(&str, &str)]) -> Result<Response, XnatError> {
        self.inner.put(&DataUri::from(path), query)
    }

    pub fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&str>,
    ) -> Result<Response, XnatError> {
        self.inner.post(&DataUri::from(path), query, body)
    }

    pub fn delete(&self, path: &str) -> Result<Response, XnatError> {
        self.inner.delete(&DataUri::from(path), &[])
    }

    /// Stream a server path into a writer.
    pub fn download(&self, path: &str, dest: &mut dyn Write) -> Result<u64, XnatError> {
        self.inner.download_to(&DataUri::from(path), &[], dest)
    }

    /// Download a server path to a local file.
    pub fn download_file(
        &self,
        path: &str,
        dest: &std::path::Path,
    ) -> Result<u64, XnatError> {
        let mut file = std::fs::File::create(dest)?;
        self.download(path, &mut file)
    }

    /// End the session: stop the heartbeat and invalidate the server-side
    /// token. Runs automatically on drop.
    pub fn disconnect(&mut self) {
        if self.inner.closed.get() {
            return;
        }
        if let Some(mut keepalive) = self.keepalive.take() {
            keepalive.stop();
        }
        if let Err(e) = self.inner.delete(&DataUri::from("/data/JSESSION"), &[]) {
            debug!(error = %e, "could not invalidate server-side session");
        }
        self.inner.closed.set(true);
        info!(server = %self.inner.server, "disconnected");
    }
}

impl Drop for XnatSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl SessionInner {
    pub(crate) fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub(crate) fn caching(&self) -> bool {
        self.caching.get()
    }

    pub(crate) fn cached_object(&self, uri: &DataUri, path: Option<&str>) -> Option<XnatObject> {
        self.object_cache
            .borrow()
            .get(&(uri.clone(), path.map(str::to_string)))
            .and_then(WeakObject::upgrade)
    }

    pub(crate) fn cache_object(&self, uri: &DataUri, path: Option<&str>, object: &XnatObject) {
        self.object_cache.borrow_mut().insert(
            (uri.clone(), path.map(str::to_string)),
            object.downgrade(),
        );
    }

    pub(crate) fn evict_object(&self, uri: &DataUri, path: Option<&str>) {
        self.object_cache
            .borrow_mut()
            .remove(&(uri.clone(), path.map(str::to_string)));
    }

    pub(crate) fn get(&self, uri: &DataUri, query: &[(&str, &str)]) -> Result<Response, XnatError> {
        self.request(Method::Get, uri, query, None, &[200])
    }

    pub(crate) fn get_json(&self, uri: &DataUri, query: &[(&str, &str)]) -> Result<Value, XnatError> {
        let response = self.get(uri, query)?;
        serde_json::from_str(&response.body).map_err(|_| XnatError::Json(uri.to_string()))
    }

    pub(crate) fn put(&self, uri: &DataUri, query: &[(&str, &str)]) -> Result<Response, XnatError> {
        self.request(Method::Put, uri, query, None, &[200, 201])
    }

    pub(crate) fn post(
        &self,
        uri: &DataUri,
        query: &[(&str, &str)],
        body: Option<&str>,
    ) -> Result<Response, XnatError> {
        self.request(Method::Post, uri, query, body, &[200, 201])
    }

    pub(crate) fn delete(&self, uri: &DataUri, query: &[(&str, &str)]) -> Result<Response, XnatError> {
        self.request(Method::Delete, uri, query, None, &[200])
    }

    pub(crate) fn download_to(
        &self,
        uri: &DataUri,
        query: &[(&str, &str)],
        dest: &mut dyn Write,
    ) -> Result<u64, XnatError> {
        if self.closed.get() {
            return Err(XnatError::SessionClosed);
        }
        let url = self.format_uri(uri)?;
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(self.transport.download(&url, &query, dest)?)
    }

    fn request(
        &self,
        method: Method,
        uri: &DataUri,
        query: &[(&str, &str)],
        body: Option<&str>,
        accepted: &[u16],
    ) -> Result<Response, XnatError> {
        if self.closed.get() {
            return Err(XnatError::SessionClosed);
        }
        let mut request = Request::new(method, self.format_uri(uri)?);
        for (key, value) in query {
            request = request.query(key, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        let response = self.transport.request(&request)?;
        check_response(uri, response, accepted)
    }

    fn format_uri(&self, uri: &DataUri) -> Result<String, XnatError> {
        let path = uri.as_str();
        let valid = path.starts_with('/')
            && !path.contains("//")
            && !path.contains("..")
            && !path.chars().any(char::is_whitespace);
        if !valid {
            return Err(XnatError::InvalidPath(path.to_string()));
        }
        Ok(format!("{}{}", self.server, path))
    }
}

/// A data endpoint answering with an HTML page is a redirect to the login
/// flow, not data; decode it into the credential error it represents.
fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with("<!DOCTYPE") || head.starts_with("<html")
}

fn check_response(uri: &DataUri, response: Response, accepted: &[u16]) -> Result<Response, XnatError> {
    if looks_like_html(&response.body) {
        if response.body.contains("expired") {
            return Err(XnatError::CredentialsExpired);
        }
        return Err(XnatError::AccessDenied);
    }
    if !accepted.contains(&response.status) {
        return Err(match response.status {
            401 | 403 => XnatError::AccessDenied,
            status => XnatError::Response {
                uri: uri.to_string(),
                status,
                text: response.body.chars().take(320).collect(),
            },
        });
    }
    Ok(response)
}

fn check_schema_body(body: &str) -> Result<(), XnatError> {
    if looks_like_html(body) {
        if body.contains("expired") {
            return Err(XnatError::CredentialsExpired);
        }
        return Err(XnatError::AccessDenied);
    }
    Ok(())
}

/// Fetch the schema documents to build the registry from: the schema
/// catalog endpoint when the server has one, the legacy fixed path
/// otherwise. Returns `(uri, body)` pairs.
fn fetch_schemas(
    transport: &dyn Transport,
    server: &str,
) -> Result<Vec<(String, String)>, XnatError> {
    let fetch = |path: &str| -> Result<Response, XnatError> {
        let request = Request::new(Method::Get, format!("{server}{path}"));
        Ok(transport.request(&request)?)
    };

    let catalog = fetch("/xapi/schemas")?;
    let names: Option<Vec<String>> = if catalog.ok() && !looks_like_html(&catalog.body) {
        serde_json::from_str(&catalog.body).ok()
    } else {
        None
    };

    let paths: Vec<String> = match names {
        Some(names) => names
            .into_iter()
            .map(|name| format!("/xapi/schemas/{name}"))
            .collect(),
        None => {
            debug!("no schema catalog endpoint, falling back to the fixed schema path");
            vec!["/schemas/xnat/xnat.xsd".to_string()]
        }
    };

    let mut queue = paths;
    let mut seen: HashSet<String> = queue.iter().cloned().collect();
    let mut schemas = Vec::with_capacity(queue.len());
    let mut index = 0;
    while index < queue.len() {
        let path = queue[index].clone();
        index += 1;
        let response = fetch(&path)?;
        if !response.ok() {
            warn!(path, status = response.status, "schema document unavailable, skipping");
            continue;
        }
        // Schemas referenced by this one (xs:import, schemaLocation) ride
        // along, as long as they live on the same server.
        if let Ok(references) = find_schema_uris(&response.body) {
            for reference in references {
                let Some(rooted) = rooted_schema_path(&reference, server) else {
                    continue;
                };
                if seen.insert(rooted.clone()) {
                    debug!(path = %rooted, referenced_by = %path, "queueing referenced schema");
                    queue.push(rooted);
                }
            }
        }
        schemas.push((path, response.body));
    }
    Ok(schemas)
}

/// Resolve a referenced schema location to a rooted path on `server`;
/// relative locations and foreign hosts are not followed.
fn rooted_schema_path(reference: &str, server: &str) -> Option<String> {
    if let Some(path) = reference.strip_prefix(server) {
        return path.starts_with('/').then(|| path.to_string());
    }
    reference.starts_with('/').then(|| reference.to_string())
}

/// Background heartbeat. Runs on a clone of the session's HTTP transport —
/// the shared cookie jar means the GETs refresh the session's own token,
/// not a second one. A send on the channel (or dropping it) stops the loop.
struct Keepalive {
    stop: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Keepalive {
    fn start(server: String, transport: HttpTransport) -> Result<Keepalive, XnatError> {
        let (stop, ticks) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("xnat-keepalive".to_string())
            .spawn(move || {
                let url = format!("{server}/data/JSESSION");
                loop {
                    match ticks.recv_timeout(KEEPALIVE_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => {
                            let request = Request::new(Method::Get, url.clone());
                            if let Err(e) = transport.request(&request) {
                                warn!(error = %e, "session heartbeat failed");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Keepalive {
            stop,
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

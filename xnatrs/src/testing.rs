//! Scripted transport for unit tests. Clones share state, so tests keep one
//! handle for inspection after handing another to the session.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::errors::TransportError;
use crate::transport::{Method, Request, Response, Transport};

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

struct Route {
    method: Method,
    path: String,
    response: Response,
}

#[derive(Default)]
struct Inner {
    routes: Vec<Route>,
    calls: Vec<RecordedCall>,
}

#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    inner: Rc<RefCell<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Script a response for requests whose URL ends with `path`. Later
    /// routes win, so a test can override an earlier script.
    pub fn route(&self, method: Method, path: &str, status: u16, body: &str) {
        self.inner.borrow_mut().routes.push(Route {
            method,
            path: path.to_string(),
            response: Response {
                status,
                body: body.to_string(),
            },
        });
    }

    pub fn route_json(&self, method: Method, path: &str, body: serde_json::Value) {
        self.route(method, path, 200, &body.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.borrow().calls.len()
    }

    fn respond(&self, method: Method, url: &str) -> Response {
        let inner = self.inner.borrow();
        inner
            .routes
            .iter()
            .rev()
            .find(|r| r.method == method && url.ends_with(&r.path))
            .map(|r| r.response.clone())
            .unwrap_or_else(|| panic!("no route scripted for {method} {url}"))
    }
}

impl Transport for MockTransport {
    fn request(&self, request: &Request) -> Result<Response, TransportError> {
        self.inner.borrow_mut().calls.push(RecordedCall {
            method: request.method,
            url: request.url.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        });
        Ok(self.respond(request.method, &request.url))
    }

    fn download(
        &self,
        url: &str,
        query: &[(String, String)],
        dest: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        self.inner.borrow_mut().calls.push(RecordedCall {
            method: Method::Get,
            url: url.to_string(),
            query: query.to_vec(),
            body: None,
        });
        let response = self.respond(Method::Get, url);
        dest.write_all(response.body.as_bytes())?;
        Ok(response.body.len() as u64)
    }
}

//! The wire seam. Everything above this module speaks [Transport]; the one
//! production implementation wraps a blocking HTTP client, and tests swap in
//! a scripted double without touching the network.

use std::io::Write;
use std::time::Duration;

use tracing::debug;

use crate::errors::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request, fully described. The URL is absolute; the session
/// owns path formatting and validation.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    /// JSON document to send, if any.
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport {
    fn request(&self, request: &Request) -> Result<Response, TransportError>;

    /// Fetch a URL and stream the payload into `dest`, returning the number
    /// of bytes written. Used for file content, which never goes through the
    /// string-bodied path.
    fn download(
        &self,
        url: &str,
        query: &[(String, String)],
        dest: &mut dyn Write,
    ) -> Result<u64, TransportError>;
}

/// Blocking HTTP transport with basic authentication. Clones share the
/// underlying client and its cookie jar, so a clone refreshes the same
/// server-side token.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    user: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    pub fn new(user: Option<&str>, password: Option<&str>) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .cookie_store(true)
            .build()?;
        Ok(HttpTransport {
            client,
            user: user.map(str::to_string),
            password: password.map(str::to_string),
        })
    }

    fn builder(&self, method: Method, url: &str) -> reqwest::blocking::RequestBuilder {
        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };
        let mut builder = self.client.request(method, url);
        if let Some(user) = &self.user {
            builder = builder.basic_auth(user, self.password.as_deref());
        }
        builder
    }
}

impl Transport for HttpTransport {
    fn request(&self, request: &Request) -> Result<Response, TransportError> {
        debug!(method = %request.method, url = %request.url, "dispatching request");
        let mut builder = self
            .builder(request.method, &request.url)
            .query(&request.query)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        debug!(status, bytes = body.len(), "received response");
        Ok(Response { status, body })
    }

    fn download(
        &self,
        url: &str,
        query: &[(String, String)],
        dest: &mut dyn Write,
    ) -> Result<u64, TransportError> {
        debug!(url, "downloading");
        let mut response = self.builder(Method::Get, url).query(&query).send()?;
        if !response.status().is_success() {
            return Err(TransportError::Other(format!(
                "download of {url} failed with status {}",
                response.status().as_u16()
            )));
        }
        let bytes = response.copy_to(dest)?;
        debug!(url, bytes, "download complete");
        Ok(bytes)
    }
}

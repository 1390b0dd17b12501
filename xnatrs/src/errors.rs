//! Errors for this crate.

/// Errors raised while turning schema documents into class descriptors.
///
/// These are all failures of the generation pass; none of them are produced
/// once a session is up and running.
#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    /// The document could not be read as XML at all.
    #[error("could not parse schema document: {0}")]
    MalformedDocument(String),

    /// The document parsed, but its root element is not an XML Schema root.
    #[error("document root is {0}, should be an XML Schema root element")]
    NotASchema(String),

    /// An extension tried to change an already-set base class.
    #[error("trying to reset base class of {class} from {old} to {new}")]
    BaseClassConflict {
        class: String,
        old: String,
        new: String,
    },

    /// A restriction chain re-declared the type of an attribute.
    #[error("trying to override type of {attribute} from a restriction ({old} to {new})")]
    RestrictionConflict {
        attribute: String,
        old: String,
        new: String,
    },

    /// Two descriptors resolved to the same xsi type identifier.
    #[error("duplicate xsi type {0} in schema set")]
    DuplicateType(String),

    /// A schema construct this parser has no handling rule for and cannot
    /// safely skip (e.g. `attributeGroup`).
    #[error("no parsing rule implemented for tag {0}")]
    UnsupportedTag(String),
}

/// Errors from the HTTP transport itself (connection failures, protocol
/// errors). Status-code handling lives a level up, in [crate::XnatError].
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors representing failed interactions with an XNAT server or its
/// generated object model.
#[derive(thiserror::Error, Debug)]
pub enum XnatError {
    /// A wire type is absent from the type registry. This is never silently
    /// downgraded to a generic object; it signals schema drift.
    #[error("type {0} is not known to this client")]
    UnknownType(String),

    /// A nested-object field whose wire type could not be determined from
    /// either the fetched data or the static hint table.
    #[error("cannot determine type of field {0}")]
    UndeterminedType(String),

    /// A field access that violates the declared shape of the property, or
    /// a scalar write violating a declared restriction. Raised before any
    /// request is dispatched.
    #[error("invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    /// Merging two filter sets with contradictory values for the same key.
    #[error("trying to redefine filter {key}={old} to {key}={new}")]
    FilterConflict {
        key: String,
        old: String,
        new: String,
    },

    /// A listing key present in neither the primary nor the secondary map.
    /// Distinct from a transport-level 404, which surfaces as [Self::Response].
    #[error("could not find ID/label {0} in collection")]
    NotFound(String),

    /// The class has no property with the requested name.
    #[error("{class} has no property {field}")]
    NoSuchProperty { class: String, field: String },

    /// Error response from the server (non-accepted status or an HTML body
    /// where data was expected).
    #[error("invalid response from XNAT for {uri} (status {status}): {text}")]
    Response {
        uri: String,
        status: u16,
        text: String,
    },

    /// The schema endpoint answered with a login page instead of a schema;
    /// the credentials are wrong or lack read access.
    #[error("no read access to this XNAT server, please check your credentials")]
    AccessDenied,

    /// The server reports the account password has expired.
    #[error("your password has expired, please update it via the website")]
    CredentialsExpired,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A response that should have carried a JSON document did not.
    #[error("could not decode JSON from {0}")]
    Json(String),

    /// A scalar value that does not parse as its declared primitive type.
    #[error("cannot convert {value} to {type_name}")]
    Conversion { value: String, type_name: String },

    /// REST paths must be rooted, e.g. `/data/projects`.
    #[error("the requested path should start with a / (e.g. /data/projects), found {0}")]
    InvalidPath(String),

    /// The owning session was dropped while object handles were still live.
    #[error("session has been closed")]
    SessionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for XnatError {
    fn from(e: reqwest::Error) -> Self {
        XnatError::Transport(TransportError::Http(e))
    }
}

//! Client library for XNAT imaging research servers.
//!
//! The object model is not written down anywhere in this crate: at connect
//! time the server's XML type schemas are parsed into class descriptors,
//! synthesized into class specs and registered in a per-session type
//! registry. Objects and listings are generic handles driven by those specs,
//! so a server extended with custom data types grows matching classes
//! without a code change here.
//!
//! The runtime is single-threaded: sessions, objects and listings share
//! state through `Rc` and are not `Send`. Use one session per thread.

pub mod constants;
pub mod convert;
pub mod errors;
mod listing;
pub mod model;
mod object;
pub mod schema;
pub mod search;
mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use convert::{FieldValue, ScalarType};
pub use errors::{SchemaError, TransportError, XnatError};
pub use listing::XnatListing;
pub use object::XnatObject;
pub use search::Query;
pub use session::XnatSession;
pub use types::{DataUri, XsiType};

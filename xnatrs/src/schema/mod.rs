//! Schema ingestion: XML document parsing, class descriptor extraction.

pub mod descriptor;
pub mod node;
pub mod parser;

pub use descriptor::{AttributePrototype, BaseRef, ClassDescriptor, PrototypeKind, Restrictions};
pub use node::{parse_document, SchemaNode};
pub use parser::{find_schema_uris, SchemaParser};

//! Class model: runtime class specs, the registry that holds them, and the
//! synthesizer that builds them from parsed schema descriptors.

pub mod overrides;
pub mod registry;
pub mod spec;
pub mod synth;

pub use registry::TypeRegistry;
pub use spec::{ClassSpec, ListingElement, ObjectKind, Property, PropertyKind};
pub use synth::ClassSynthesizer;

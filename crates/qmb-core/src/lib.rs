#![deny(missing_docs)]
#![doc = "Shared primitives for the qmb batch orchestration crates."]

pub mod errors;
pub mod hash;
pub mod provenance;
pub mod serde;

pub use errors::{BatchError, ErrorInfo};
pub use hash::{short_hash, stable_hash_string};
pub use provenance::{BatchProvenance, SchemaVersion};
pub use serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_yaml_string};

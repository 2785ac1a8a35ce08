//! YAML manifest loading: environment substitution, cross-document `$ref`
//! resolution, CRD-backed schema validation, and the `MastraPod` composite
//! document format.

pub mod crd_registry;
pub mod loader;
pub mod refs;
pub mod schema;

pub use crd_registry::{CompiledCrd, CrdRegistry};
pub use loader::{DslLoader, MastraPod};
pub use refs::{resolve_batch_refs, substitute_env};

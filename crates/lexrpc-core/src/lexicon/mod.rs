//! Lexicon documents and the definition registry.
//!
//! A lexicon is a JSON document with an `id` NSID and a map of named
//! definitions. Loading flattens documents into a [`Registry`] keyed by
//! fully-qualified id:
//! - `main` is stored under the lexicon id itself
//! - any other name `x` is stored under `id#x`

mod loader;
mod registry;
mod schema;

pub use loader::{bundled_documents, load_dir, load_file};
pub use registry::Registry;
pub use schema::{Body, DefType, Definition, Schema};

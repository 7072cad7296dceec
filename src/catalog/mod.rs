//! Label catalog: manifest parsing and the `id -> label` index.
//!
//! The manifest is the object-detection label map format:
//!
//! ```text
//! item {
//!   name: "/m/01g317"
//!   id: 1
//!   display_name: "person"
//! }
//! ```

mod index;
mod parser;

pub use index::{CatalogIndex, DuplicateIdPolicy};
pub use parser::{parse_catalog, CatalogItem};

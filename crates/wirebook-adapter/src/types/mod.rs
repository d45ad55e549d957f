/*
[INPUT]:  Unified schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared by caches, venues and callers
[UPDATE]: When the unified schema changes or new types added
*/

pub mod enums;
pub mod models;

pub use enums::*;
pub use models::*;

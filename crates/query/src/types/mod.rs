//! Core types shared by the query layer.
//!
//! - [`FieldTypeMap`] / [`FieldType`] - per-index field metadata
//! - [`QueryBody`] - a typed, null-free search request body
//! - [`ResultBatch`] / [`ScrollCursor`] - pages of hits and scroll handles

mod batch;
mod body;
mod field;

pub use batch::{ResultBatch, ScrollCursor, total_hits};
pub use body::QueryBody;
pub use field::{FieldType, FieldTypeMap, IndexFields};

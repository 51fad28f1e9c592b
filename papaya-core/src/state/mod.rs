pub mod document;
pub mod graph;

pub use document::{Document, DocumentID};

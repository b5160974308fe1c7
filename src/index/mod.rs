//! Persistent vector index

pub mod store;

pub use store::{IndexHit, VectorIndex};

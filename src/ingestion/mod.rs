//! Document chunking

pub mod chunker;

pub use chunker::TextChunker;

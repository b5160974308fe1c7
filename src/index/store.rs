//! SQLite-backed vector index with per-document atomic replacement
//!
//! Chunk text, metadata, and embedding vectors live in one database so the
//! index durably survives restarts. All rows for a document are replaced
//! inside a single transaction: a concurrent reader observes either the
//! pre-upsert or the post-upsert state for that document id, never a mix.
//!
//! Similarity is cosine over the full row set. The metric and vector
//! dimensionality are fixed when the index is created and validated
//! against on every open and every upsert.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// A raw nearest-neighbor match from the index. The retriever layers
/// score thresholds and dedup policy on top of these.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub sequence_index: usize,
    pub text: String,
    pub score: f32,
}

/// Persistent vector index over document chunks
pub struct VectorIndex {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl VectorIndex {
    /// Open (or create) an index at the given path
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::Index(format!("failed to open database: {}", e)))?;
        Self::initialize(conn, dimensions)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Index(format!("failed to open in-memory database: {}", e)))?;
        Self::initialize(conn, dimensions)
    }

    fn initialize(conn: Connection, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Config("index dimensions must be positive".to_string()));
        }

        let index = Self {
            conn: Mutex::new(conn),
            dimensions,
        };
        index.migrate()?;
        index.check_meta()?;
        Ok(index)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                sequence_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                char_start INTEGER NOT NULL,
                char_end INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);
            "#,
        )
        .map_err(|e| Error::Index(format!("failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// Validate stored dimensionality and metric, writing them on first use
    fn check_meta(&self) -> Result<()> {
        let conn = self.conn.lock();

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Index(format!("failed to read index meta: {}", e)))?;

        match stored {
            Some(value) => {
                let stored_dims: usize = value
                    .parse()
                    .map_err(|_| Error::Index(format!("corrupt dimensions meta: {}", value)))?;
                if stored_dims != self.dimensions {
                    return Err(Error::DimensionMismatch {
                        expected: stored_dims,
                        actual: self.dimensions,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimensions', ?1), ('metric', 'cosine')",
                    params![self.dimensions.to_string()],
                )
                .map_err(|e| Error::Index(format!("failed to write index meta: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Embedding dimensionality this index accepts
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Replace all chunks and vectors for a document atomically.
    ///
    /// Validation happens before any mutation: on error the prior state for
    /// the document id is fully retained.
    pub fn upsert(
        &self,
        document_id: Uuid,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model_id: &str,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::InvalidArgument(format!(
                "chunk count ({}) does not match vector count ({})",
                chunks.len(),
                vectors.len()
            )));
        }
        for vector in vectors {
            if vector.len() != self.dimensions {
                return Err(Error::DimensionMismatch {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
        }
        for chunk in chunks {
            if chunk.document_id != document_id {
                return Err(Error::InvalidArgument(format!(
                    "chunk {} belongs to document {}, not {}",
                    chunk.id, chunk.document_id, document_id
                )));
            }
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Index(format!("failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )
        .map_err(|e| Error::Index(format!("failed to clear document rows: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO chunks (
                        id, document_id, sequence_index, content,
                        char_start, char_end, model_id, embedding
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .map_err(|e| Error::Index(format!("failed to prepare insert: {}", e)))?;

            for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
                stmt.execute(params![
                    chunk.id.to_string(),
                    document_id.to_string(),
                    chunk.sequence_index as i64,
                    chunk.text,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    model_id,
                    vector_to_blob(vector),
                ])
                .map_err(|e| Error::Index(format!("failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| Error::Index(format!("failed to commit upsert: {}", e)))?;

        tracing::debug!(
            document_id = %document_id,
            chunks = chunks.len(),
            "replaced document in vector index"
        );
        Ok(())
    }

    /// Remove all chunks for a document. Deleting an absent id is a no-op.
    pub fn delete(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let deleted = conn
            .execute(
                "DELETE FROM chunks WHERE document_id = ?1",
                params![document_id.to_string()],
            )
            .map_err(|e| Error::Index(format!("failed to delete document: {}", e)))?;
        Ok(deleted)
    }

    /// Return up to `k` nearest chunks by cosine similarity, descending by
    /// score with ties broken by ascending chunk id.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be positive".to_string()));
        }
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_id, sequence_index, content, embedding FROM chunks",
                )
                .map_err(|e| Error::Index(format!("failed to prepare query: {}", e)))?;

            let mapped = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                })
                .map_err(|e| Error::Index(format!("failed to scan index: {}", e)))?;

            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row.map_err(|e| Error::Index(format!("failed to read row: {}", e)))?);
            }
            rows
        };

        let mut hits = Vec::with_capacity(rows.len());
        for (id, document_id, sequence_index, content, blob) in rows {
            let chunk_id = Uuid::parse_str(&id)
                .map_err(|e| Error::Index(format!("corrupt chunk id {}: {}", id, e)))?;
            let document_id = Uuid::parse_str(&document_id)
                .map_err(|e| Error::Index(format!("corrupt document id: {}", e)))?;

            if let Some(doc_ids) = filter {
                if !doc_ids.contains(&document_id) {
                    continue;
                }
            }

            let stored = blob_to_vector(&blob);
            let score = cosine_similarity(vector, &stored);
            hits.push(IndexHit {
                chunk_id,
                document_id,
                sequence_index: sequence_index as usize,
                text: content,
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Total number of chunks stored
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| Error::Index(format!("failed to count chunks: {}", e)))?;
        Ok(count as usize)
    }

    /// Check if the index holds no chunks
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of chunks stored for one document
    pub fn document_chunk_count(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Index(format!("failed to count document chunks: {}", e)))?;
        Ok(count as usize)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity; zero-norm vectors score 0.0
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(document_id: Uuid, seq: usize, text: &str) -> Chunk {
        Chunk::new(document_id, seq, text.to_string(), seq * 10, seq * 10 + text.len())
    }

    fn unit(x: f32, y: f32, z: f32) -> Vec<f32> {
        vec![x, y, z]
    }

    #[test]
    fn query_orders_by_similarity() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc = Uuid::new_v4();
        let chunks = vec![
            make_chunk(doc, 0, "north"),
            make_chunk(doc, 1, "east"),
            make_chunk(doc, 2, "mostly north"),
        ];
        let vectors = vec![unit(0.0, 1.0, 0.0), unit(1.0, 0.0, 0.0), unit(0.3, 1.0, 0.0)];
        index.upsert(doc, &chunks, &vectors, "test-model").unwrap();

        let hits = index.query(&unit(0.0, 1.0, 0.0), 3, None).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "mostly north");
        assert_eq!(hits[2].text, "east");
        assert!(hits[0].score > hits[1].score && hits[1].score > hits[2].score);
    }

    #[test]
    fn query_rejects_zero_k_and_bad_dimensions() {
        let index = VectorIndex::in_memory(3).unwrap();
        assert!(matches!(
            index.query(&unit(1.0, 0.0, 0.0), 0, None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            index.query(&[1.0, 0.0], 5, None),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn upsert_rejects_mismatched_vectors_before_mutation() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc = Uuid::new_v4();
        let chunks = vec![make_chunk(doc, 0, "first")];
        index
            .upsert(doc, &chunks, &[unit(1.0, 0.0, 0.0)], "test-model")
            .unwrap();

        let more = vec![make_chunk(doc, 0, "replacement")];
        let err = index.upsert(doc, &more, &[vec![1.0, 0.0]], "test-model");
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));

        // prior state fully retained
        let hits = index.query(&unit(1.0, 0.0, 0.0), 1, None).unwrap();
        assert_eq!(hits[0].text, "first");
    }

    #[test]
    fn upsert_replaces_all_rows_for_document() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc = Uuid::new_v4();
        let old = vec![make_chunk(doc, 0, "old a"), make_chunk(doc, 1, "old b")];
        index
            .upsert(doc, &old, &[unit(1.0, 0.0, 0.0), unit(0.0, 1.0, 0.0)], "m")
            .unwrap();

        let new = vec![make_chunk(doc, 0, "new a")];
        index.upsert(doc, &new, &[unit(0.0, 0.0, 1.0)], "m").unwrap();

        let hits = index.query(&unit(0.0, 0.0, 1.0), 10, None).unwrap();
        let texts: Vec<_> = hits
            .iter()
            .filter(|h| h.document_id == doc)
            .map(|h| h.text.as_str())
            .collect();
        assert_eq!(texts, vec!["new a"]);
        assert_eq!(index.document_chunk_count(doc).unwrap(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc = Uuid::new_v4();
        index
            .upsert(doc, &[make_chunk(doc, 0, "x")], &[unit(1.0, 0.0, 0.0)], "m")
            .unwrap();

        assert_eq!(index.delete(doc).unwrap(), 1);
        assert_eq!(index.delete(doc).unwrap(), 0);
        assert_eq!(index.delete(Uuid::new_v4()).unwrap(), 0);
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn document_filter_restricts_results() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        index
            .upsert(doc_a, &[make_chunk(doc_a, 0, "a")], &[unit(1.0, 0.0, 0.0)], "m")
            .unwrap();
        index
            .upsert(doc_b, &[make_chunk(doc_b, 0, "b")], &[unit(1.0, 0.1, 0.0)], "m")
            .unwrap();

        let hits = index
            .query(&unit(1.0, 0.0, 0.0), 10, Some(&[doc_b]))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, doc_b);
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let index = VectorIndex::in_memory(3).unwrap();
        let doc = Uuid::new_v4();
        let chunks = vec![
            make_chunk(doc, 0, "twin one"),
            make_chunk(doc, 1, "twin two"),
            make_chunk(doc, 2, "twin three"),
        ];
        let same = unit(0.5, 0.5, 0.0);
        index
            .upsert(doc, &chunks, &[same.clone(), same.clone(), same.clone()], "m")
            .unwrap();

        let first = index.query(&unit(0.5, 0.5, 0.0), 3, None).unwrap();
        let second = index.query(&unit(0.5, 0.5, 0.0), 3, None).unwrap();
        let ids_first: Vec<_> = first.iter().map(|h| h.chunk_id).collect();
        let ids_second: Vec<_> = second.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids_first, ids_second);

        let mut sorted = ids_first.clone();
        sorted.sort();
        assert_eq!(ids_first, sorted);
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let doc = Uuid::new_v4();
        let chunks = vec![make_chunk(doc, 0, "persisted"), make_chunk(doc, 1, "rows")];
        let vectors = vec![unit(1.0, 0.0, 0.0), unit(0.0, 1.0, 0.0)];

        let before = {
            let index = VectorIndex::open(&path, 3).unwrap();
            index.upsert(doc, &chunks, &vectors, "m").unwrap();
            index.query(&unit(1.0, 0.0, 0.0), 2, None).unwrap()
        };

        let index = VectorIndex::open(&path, 3).unwrap();
        let after = index.query(&unit(1.0, 0.0, 0.0), 2, None).unwrap();

        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.text, b.text);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn reopen_with_different_dimensions_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        VectorIndex::open(&path, 3).unwrap();
        assert!(matches!(
            VectorIndex::open(&path, 4),
            Err(Error::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }
}

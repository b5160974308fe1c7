//! End-to-end pipeline tests with deterministic fixture providers

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use quiz_rag::config::RagConfig;
use quiz_rag::index::VectorIndex;
use quiz_rag::providers::{EmbeddingProvider, LlmProvider};
use quiz_rag::types::document::DocumentStatus;
use quiz_rag::types::Chunk;
use quiz_rag::{Error, GenerateRequest, NewDocument, RagPipeline, Result};

const DIMENSIONS: usize = 16;

/// Deterministic embedder hashing whitespace tokens onto vector buckets,
/// so texts sharing words land near each other
struct HashEmbedder {
    fail: AtomicBool,
}

impl HashEmbedder {
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("backend offline".to_string()));
        }

        let mut v = vec![0.0f32; DIMENSIONS];
        for (i, token) in text.to_lowercase().split_whitespace().enumerate() {
            let digest = Sha256::digest(token.as_bytes());
            let h = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]);
            let idx = (h as usize) % DIMENSIONS;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn model_id(&self) -> &str {
        "hash-test"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// LLM fixture returning a fixed reply and counting invocations
struct ScriptedLlm {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model(&self) -> &str {
        "scripted-test"
    }
}

const TWO_QUESTIONS: &str = r#"1. Question: When does the harvest festival begin?
A) At the first frost
B) At midsummer
C) After the spring rains
D) On the winter solstice
Correct Answer: A
Explanation: The text ties the festival to the first frost.

2. Question: What is stored in the granary?
A) Wool
B) Barley
C) Timber
D) Salt
Correct Answer: B
Explanation: The granary holds the barley harvest.
"#;

const DOCUMENT_TEXT: &str = "The harvest festival begins at the first frost. \
Villagers gather barley from the fields and store it in the granary. \
The harvest is weighed and recorded by the steward. \
Families bring preserves and share them during the festival. \
The granary ledger lists every sack of barley by weight. \
When the harvest is poor the steward rations the barley through winter.";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config(dir: &std::path::Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config.embeddings.dimensions = DIMENSIONS;
    config.retrieval.min_score = 0.05;
    config.vector_db.storage_path = dir.join("index.db");
    config
}

fn build_pipeline(
    dir: &std::path::Path,
    embedder: Arc<HashEmbedder>,
    llm: Arc<ScriptedLlm>,
) -> (RagPipeline, Arc<VectorIndex>) {
    let config = test_config(dir);
    let index = Arc::new(VectorIndex::open(&config.vector_db.storage_path, DIMENSIONS).unwrap());
    let pipeline = RagPipeline::new(config, embedder, llm, Arc::clone(&index)).unwrap();
    (pipeline, index)
}

#[tokio::test]
async fn ingest_then_generate_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let (pipeline, index) = build_pipeline(dir.path(), embedder, llm.clone());

    let doc_id = Uuid::new_v4();
    let document = pipeline
        .ingest(NewDocument::new(doc_id, "uploads/harvest.txt", DOCUMENT_TEXT))
        .await
        .unwrap();

    assert_eq!(document.status, DocumentStatus::Indexed);
    assert!(document.total_chunks > 1);
    assert_eq!(index.document_chunk_count(doc_id).unwrap(), document.total_chunks);

    let results = pipeline.answer_query("barley harvest", 5).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| {
        let text = r.text.to_lowercase();
        text.contains("barley") || text.contains("harvest")
    }));

    let specs = pipeline
        .generate(GenerateRequest::new(2).with_query("barley harvest festival"))
        .await
        .unwrap();

    assert_eq!(specs.len(), 2);
    for spec in &specs {
        assert!(spec.is_valid());
        assert!(!spec.source_chunk_ids.is_empty());
    }
    assert_eq!(specs[0].correct_option_index, 0);
    assert_eq!(specs[1].correct_option_index, 1);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn reingesting_unchanged_content_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let (pipeline, index) = build_pipeline(dir.path(), embedder, llm);

    let doc_id = Uuid::new_v4();
    let first = pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", DOCUMENT_TEXT))
        .await
        .unwrap();
    let len_after_first = index.len().unwrap();
    let hits_before = index.query(&[1.0; DIMENSIONS], 32, None).unwrap();

    let second = pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", DOCUMENT_TEXT))
        .await
        .unwrap();

    assert_eq!(index.len().unwrap(), len_after_first);
    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(pipeline.documents().len(), 1);

    // chunk identities untouched by the no-op re-ingest
    let hits_after = index.query(&[1.0; DIMENSIONS], 32, None).unwrap();
    let ids_before: Vec<_> = hits_before.iter().map(|h| h.chunk_id).collect();
    let ids_after: Vec<_> = hits_after.iter().map(|h| h.chunk_id).collect();
    assert_eq!(ids_before, ids_after);
}

#[tokio::test]
async fn reingesting_changed_content_replaces_the_document() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let (pipeline, index) = build_pipeline(dir.path(), embedder, llm);

    let doc_id = Uuid::new_v4();
    pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", DOCUMENT_TEXT))
        .await?;

    let updated = pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", "A short replacement note."))
        .await?;

    assert_eq!(updated.total_chunks, 1);
    assert_eq!(index.document_chunk_count(doc_id)?, 1);
    assert_eq!(pipeline.documents().len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_embedding_marks_document_failed_and_keeps_index_state() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let (pipeline, index) = build_pipeline(dir.path(), Arc::clone(&embedder), llm);

    let doc_id = Uuid::new_v4();
    pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", DOCUMENT_TEXT))
        .await
        .unwrap();
    let chunks_before = index.document_chunk_count(doc_id).unwrap();

    embedder.set_failing(true);
    let err = pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", "entirely new content here"))
        .await
        .unwrap_err();

    match err {
        Error::Ingest {
            document_id, stage, ..
        } => {
            assert_eq!(document_id, doc_id);
            assert_eq!(stage, "embedding");
        }
        other => panic!("expected Ingest error, got {:?}", other),
    }

    let document = pipeline.document(doc_id).unwrap();
    assert!(matches!(document.status, DocumentStatus::Failed { .. }));

    // the index still serves the pre-ingest state for this id
    assert_eq!(index.document_chunk_count(doc_id).unwrap(), chunks_before);

    // recovery: ingest succeeds again once the backend is back
    embedder.set_failing(false);
    let recovered = pipeline
        .ingest(NewDocument::new(doc_id, "a.txt", "entirely new content here"))
        .await
        .unwrap();
    assert_eq!(recovered.status, DocumentStatus::Indexed);
}

#[tokio::test]
async fn generate_on_empty_context_fails_without_calling_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let (pipeline, _index) = build_pipeline(dir.path(), embedder, llm.clone());

    // nothing ingested: retrieval has nothing above the threshold
    let err = pipeline
        .generate(GenerateRequest::new(5).with_query("topic nobody wrote about"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientContext));
    assert_eq!(llm.calls(), 0);

    let results = pipeline
        .answer_query("topic nobody wrote about", 3)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn registry_and_index_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashEmbedder::new());
    let llm = Arc::new(ScriptedLlm::new(TWO_QUESTIONS));
    let doc_id = Uuid::new_v4();

    let query_before = {
        let (pipeline, _index) =
            build_pipeline(dir.path(), Arc::clone(&embedder), Arc::clone(&llm));
        pipeline
            .ingest(NewDocument::new(doc_id, "a.txt", DOCUMENT_TEXT))
            .await
            .unwrap();
        pipeline.answer_query("barley harvest", 5).await.unwrap()
    };

    let (pipeline, _index) = build_pipeline(dir.path(), embedder, llm);
    let document = pipeline.document(doc_id).unwrap();
    assert_eq!(document.status, DocumentStatus::Indexed);

    let query_after = pipeline.answer_query("barley harvest", 5).await.unwrap();
    let ids_before: Vec<_> = query_before.iter().map(|r| r.chunk_id).collect();
    let ids_after: Vec<_> = query_after.iter().map(|r| r.chunk_id).collect();
    assert_eq!(ids_before, ids_after);
}

/// A reader querying during upserts observes either the old or the new
/// version of a document, never a mixture.
#[test]
fn concurrent_reader_never_sees_mixed_document_state() {
    let index = Arc::new(VectorIndex::in_memory(4).unwrap());
    let doc = Uuid::new_v4();

    fn upsert_version(index: &VectorIndex, doc: Uuid, version: &str) {
        let chunks: Vec<Chunk> = (0..6)
            .map(|i| Chunk::new(doc, i, format!("{}-{}", version, i), i * 10, i * 10 + 4))
            .collect();
        let vectors: Vec<Vec<f32>> = (0..6)
            .map(|i| vec![1.0, i as f32 * 0.01, 0.0, 0.0])
            .collect();
        index.upsert(doc, &chunks, &vectors, "m").unwrap();
    }

    upsert_version(&index, doc, "v1");

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let mut observations = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let hits = index.query(&[1.0, 0.0, 0.0, 0.0], 16, None).unwrap();
                let versions: HashSet<&str> = hits
                    .iter()
                    .filter(|h| h.document_id == doc)
                    .filter_map(|h| h.text.split('-').next())
                    .collect();
                assert!(
                    versions.len() <= 1,
                    "observed mixed document versions: {:?}",
                    versions
                );
                observations += 1;
            }
            observations
        })
    };

    for i in 0..50 {
        upsert_version(&index, doc, if i % 2 == 0 { "v2" } else { "v1" });
    }

    stop.store(true, Ordering::SeqCst);
    let observations = reader.join().unwrap();
    assert!(observations > 0);
}

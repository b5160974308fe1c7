//! Pipeline orchestrator wiring chunking, embedding, indexing, retrieval,
//! and generation into the two end-to-end flows
//!
//! `ingest` drives a document through `uploaded -> chunking -> embedding ->
//! indexed`; any failure marks it `failed` with the recorded cause and the
//! vector index keeps its pre-ingest state for that id. `generate` combines
//! retrieval and question synthesis, refusing to call the model on empty
//! context.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::QuestionGenerator;
use crate::index::VectorIndex;
use crate::ingestion::TextChunker;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::Retriever;
use crate::types::document::{content_hash, Document, DocumentStatus, NewDocument};
use crate::types::{GenerateRequest, QuestionSpec, RetrievalResult};

/// Generic coverage query used when a generation request does not scope
/// retrieval itself
const COVERAGE_QUERY: &str =
    "Summarize the main topics and key information in these documents";

/// The assembled RAG pipeline
pub struct RagPipeline {
    config: RagConfig,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    generator: QuestionGenerator,
    /// Document registry, persisted as JSON next to the index database
    documents: DashMap<Uuid, Document>,
    registry_path: Option<PathBuf>,
    /// Per-document locks serializing concurrent ingests of the same id
    ingest_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl RagPipeline {
    /// Assemble a pipeline from configuration and injected providers.
    ///
    /// The vector index is passed as an explicit handle rather than opened
    /// internally, so tests and embedding applications control its
    /// lifecycle.
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        index: Arc<VectorIndex>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimensions() != index.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: index.dimensions(),
                actual: embedder.dimensions(),
            });
        }

        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&index),
            config.retrieval.clone(),
        );
        let generator = QuestionGenerator::new(llm, config.generation.clone());

        let registry_path = config
            .vector_db
            .storage_path
            .parent()
            .map(|p| p.join("documents.json"));
        let documents = Self::load_registry(registry_path.as_deref());
        tracing::info!(documents = documents.len(), "pipeline initialized");

        Ok(Self {
            config,
            chunker,
            embedder,
            index,
            retriever,
            generator,
            documents,
            registry_path,
            ingest_locks: DashMap::new(),
        })
    }

    /// Ingest a document: chunk, embed, and atomically replace its index
    /// entries. Re-ingesting an unchanged document is a no-op; re-ingesting
    /// changed content replaces the previous version.
    pub async fn ingest(&self, source: NewDocument) -> Result<Document> {
        let lock = {
            let entry = self
                .ingest_locks
                .entry(source.id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
            entry.value().clone()
        };
        let _guard = lock.lock().await;

        let hash = content_hash(&source.raw_text);
        if let Some(existing) = self.documents.get(&source.id).map(|d| d.clone()) {
            if existing.content_hash == hash && existing.status == DocumentStatus::Indexed {
                tracing::info!(document_id = %source.id, "content unchanged, skipping re-ingest");
                return Ok(existing);
            }
        }

        let mut document = Document::new(&source);
        self.track(document.clone());

        document.status = DocumentStatus::Chunking;
        self.track(document.clone());
        let chunks = self.chunker.chunk(source.id, &source.raw_text);
        if chunks.is_empty() {
            return Err(self.fail(document, "chunking", "document has no text"));
        }
        tracing::debug!(document_id = %source.id, chunks = chunks.len(), "document chunked");

        document.status = DocumentStatus::Embedding;
        self.track(document.clone());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = match self.embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => return Err(self.fail(document, "embedding", &e.to_string())),
        };

        if let Err(e) = self
            .index
            .upsert(source.id, &chunks, &vectors, self.embedder.model_id())
        {
            return Err(self.fail(document, "indexing", &e.to_string()));
        }

        document.status = DocumentStatus::Indexed;
        document.total_chunks = chunks.len();
        self.track(document.clone());
        tracing::info!(
            document_id = %source.id,
            chunks = chunks.len(),
            "document indexed"
        );
        Ok(document)
    }

    /// Remove a document from the index and the registry. Removing an
    /// unknown id is a no-op.
    pub async fn remove(&self, document_id: Uuid) -> Result<bool> {
        let lock = {
            let entry = self
                .ingest_locks
                .entry(document_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
            entry.value().clone()
        };
        let _guard = lock.lock().await;

        let deleted = self.index.delete(document_id)?;
        let known = self.documents.remove(&document_id).is_some();
        if known {
            self.save_registry();
        }
        Ok(deleted > 0 || known)
    }

    /// Pure read path: retrieve relevant chunks for a query
    pub async fn answer_query(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        self.retriever.retrieve(query_text, top_k, None).await
    }

    /// Generate validated multiple-choice questions from retrieved context
    pub async fn generate(&self, request: GenerateRequest) -> Result<Vec<QuestionSpec>> {
        if request.count == 0 {
            return Err(Error::InvalidArgument(
                "question count must be positive".to_string(),
            ));
        }

        let query = request.query.as_deref().unwrap_or(COVERAGE_QUERY);
        let top_k = request.top_k.unwrap_or(self.config.retrieval.top_k);
        let context = self
            .retriever
            .retrieve(query, top_k, request.document_filter.as_deref())
            .await?;

        if context.is_empty() {
            tracing::warn!(query, "no context above the relevance threshold");
            return Err(Error::InsufficientContext);
        }

        self.generator
            .generate_questions(&context, request.count)
            .await
    }

    /// List all tracked documents
    pub fn documents(&self) -> Vec<Document> {
        self.documents.iter().map(|e| e.value().clone()).collect()
    }

    /// Look up one document by id
    pub fn document(&self, id: Uuid) -> Option<Document> {
        self.documents.get(&id).map(|e| e.clone())
    }

    /// Mark a document failed, record the cause, and build the ingest error
    fn fail(&self, mut document: Document, stage: &'static str, message: &str) -> Error {
        tracing::error!(
            document_id = %document.id,
            stage,
            message,
            "ingest failed"
        );
        document.status = DocumentStatus::Failed {
            reason: format!("{}: {}", stage, message),
        };
        self.track(document.clone());
        Error::Ingest {
            document_id: document.id,
            stage,
            message: message.to_string(),
        }
    }

    fn track(&self, document: Document) {
        self.documents.insert(document.id, document);
        self.save_registry();
    }

    fn load_registry(path: Option<&std::path::Path>) -> DashMap<Uuid, Document> {
        let documents = DashMap::new();
        let Some(path) = path else {
            return documents;
        };
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Vec<Document>>(&content) {
                    Ok(docs) => {
                        for doc in docs {
                            documents.insert(doc.id, doc);
                        }
                    }
                    Err(e) => tracing::warn!("failed to parse document registry: {}", e),
                },
                Err(e) => tracing::warn!("failed to read document registry: {}", e),
            }
        }
        documents
    }

    fn save_registry(&self) {
        let Some(path) = &self.registry_path else {
            return;
        };
        let docs: Vec<Document> = self.documents();
        match serde_json::to_string_pretty(&docs) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    tracing::error!("failed to save document registry: {}", e);
                }
            }
            Err(e) => tracing::error!("failed to serialize document registry: {}", e),
        }
    }
}

//! Ingestion pipeline: directory tree → chunks → embeddings → index.
//!
//! Chunks are embedded in batches. A chunk that cannot be embedded is
//! logged and skipped; a run of consecutive failures is treated as a
//! provider outage and aborts the run. Re-running against a non-empty
//! index appends duplicates.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use vta_core::config::VtaConfig;
use vta_core::error::{Result, VtaError};
use vta_core::traits::Embedder;
use walkdir::WalkDir;

use crate::chunker::TokenChunker;
use crate::index::{ChunkMetadata, VectorIndex};
use crate::loader::load_document;
use crate::normalize::{normalize, safe_embed};
use crate::provenance::ProvenanceRegistry;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
    pub total_vectors: usize,
}

pub struct IngestPipeline {
    chunker: TokenChunker,
    embedder: Arc<dyn Embedder>,
    provenance: ProvenanceRegistry,
    batch_size: usize,
    max_consecutive_failures: usize,
    min_split_chars: usize,
    extensions: Vec<String>,
}

#[derive(Default)]
struct Batch {
    texts: Vec<String>,
    metas: Vec<ChunkMetadata>,
}

impl Batch {
    fn len(&self) -> usize {
        self.texts.len()
    }

    fn take(&mut self) -> Batch {
        std::mem::take(self)
    }
}

/// Consecutive embedding failures across batches.
struct FailureTracker {
    consecutive: usize,
    limit: usize,
}

impl FailureTracker {
    fn success(&mut self) {
        self.consecutive = 0;
    }

    fn failure(&mut self, source: &str, chunk_id: usize, err: &VtaError) -> Result<()> {
        self.consecutive += 1;
        tracing::warn!("⚠️ Skipping chunk {chunk_id} of {source}: {err}");
        if self.limit > 0 && self.consecutive >= self.limit {
            return Err(VtaError::EmbeddingOutage(format!(
                "{} consecutive chunks failed, last error: {err}",
                self.consecutive
            )));
        }
        Ok(())
    }
}

impl IngestPipeline {
    pub fn new(chunker: TokenChunker, embedder: Arc<dyn Embedder>, provenance: ProvenanceRegistry) -> Self {
        Self {
            chunker,
            embedder,
            provenance,
            batch_size: 16,
            max_consecutive_failures: 8,
            min_split_chars: 16,
            extensions: vec!["txt".into(), "html".into(), "md".into()],
        }
    }

    /// Pipeline with batching, failure and provenance settings from `[ingest]`.
    pub fn from_config(config: &VtaConfig, chunker: TokenChunker, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let provenance = ProvenanceRegistry::from_config(&config.ingest.collections)?;
        Ok(Self::new(chunker, embedder, provenance)
            .with_batch_size(config.ingest.batch_size)
            .with_max_consecutive_failures(config.ingest.max_consecutive_failures)
            .with_min_split_chars(config.ingest.min_split_chars)
            .with_extensions(config.ingest.extensions.clone()))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Zero disables the outage check.
    pub fn with_max_consecutive_failures(mut self, limit: usize) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    pub fn with_min_split_chars(mut self, min_split_chars: usize) -> Self {
        self.min_split_chars = min_split_chars;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        self
    }

    /// Ingest `root` into `index`, then persist the index pair.
    pub async fn ingest(
        &self,
        root: &Path,
        index: &mut VectorIndex,
        index_path: &Path,
        meta_path: &Path,
    ) -> Result<IngestReport> {
        let report = self.ingest_dir(root, index).await?;
        index.save(index_path, meta_path)?;
        Ok(report)
    }

    /// Walk `root` and append every supported document's chunks to `index`.
    pub async fn ingest_dir(&self, root: &Path, index: &mut VectorIndex) -> Result<IngestReport> {
        if !root.is_dir() {
            return Err(VtaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory {} does not exist", root.display()),
            )));
        }
        if self.embedder.dimensions() != index.embed_dim() {
            return Err(VtaError::Configuration(format!(
                "embedder {} produces {} dimensions, index expects {}",
                self.embedder.name(),
                self.embedder.dimensions(),
                index.embed_dim()
            )));
        }

        let started = Instant::now();
        let mut report = IngestReport::default();
        let mut failures = FailureTracker {
            consecutive: 0,
            limit: self.max_consecutive_failures,
        };
        let mut batch = Batch::default();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {e}", root.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.wants(entry.path()) {
                continue;
            }
            report.files_seen += 1;
            let path = entry.path();

            let text = match load_document(path) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            if text.trim().is_empty() {
                tracing::debug!("Skipping empty document {}", path.display());
                continue;
            }
            let chunks = match self.chunker.chunk(&text) {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            tracing::debug!(
                "Loaded {} ({} chars, {} chunks)",
                path.display(),
                text.len(),
                chunks.len()
            );

            let source = self.provenance.locate(path);
            report.files_indexed += 1;
            for (chunk_id, chunk) in chunks.into_iter().enumerate() {
                batch.metas.push(ChunkMetadata::new(source.clone(), chunk_id, chunk.clone()));
                batch.texts.push(chunk);
                if batch.len() >= self.batch_size {
                    self.flush(batch.take(), index, &mut report, &mut failures).await?;
                }
            }
        }
        if !batch.texts.is_empty() {
            self.flush(batch.take(), index, &mut report, &mut failures).await?;
        }

        report.total_vectors = index.len();
        tracing::info!(
            "✅ Ingestion of {} complete in {:.1}s: {} files, {} chunks indexed, {} skipped, {} total vectors",
            root.display(),
            started.elapsed().as_secs_f32(),
            report.files_indexed,
            report.chunks_indexed,
            report.chunks_skipped,
            report.total_vectors
        );
        Ok(report)
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }

    /// Embed a batch and append the chunks that succeeded.
    async fn flush(
        &self,
        batch: Batch,
        index: &mut VectorIndex,
        report: &mut IngestReport,
        failures: &mut FailureTracker,
    ) -> Result<()> {
        let embedded = self.embed_batch(&batch, failures).await?;

        let mut vectors = Vec::with_capacity(batch.len());
        let mut metas = Vec::with_capacity(batch.len());
        for (meta, vector) in batch.metas.into_iter().zip(embedded) {
            match vector {
                Some(v) => {
                    vectors.push(v);
                    metas.push(meta);
                }
                None => report.chunks_skipped += 1,
            }
        }
        if vectors.is_empty() {
            tracing::warn!("No valid embeddings in this batch");
            return Ok(());
        }

        let added = vectors.len();
        index.add(vectors, metas)?;
        report.chunks_indexed += added;
        tracing::info!("Indexed {added} chunks; total is now {}", index.len());
        Ok(())
    }

    /// One unit vector per chunk, `None` where the chunk was skipped.
    ///
    /// Tries a single batch call first; if it fails, each chunk is embedded
    /// on its own with the length-tolerant fallback.
    async fn embed_batch(&self, batch: &Batch, failures: &mut FailureTracker) -> Result<Vec<Option<Vec<f32>>>> {
        match self.embedder.embed_batch(&batch.texts).await {
            Ok(raw) if raw.len() == batch.len() => {
                let mut out = Vec::with_capacity(raw.len());
                for (v, meta) in raw.iter().zip(&batch.metas) {
                    match normalize(v) {
                        Ok(unit) => {
                            failures.success();
                            out.push(Some(unit));
                        }
                        Err(e) => {
                            failures.failure(&meta.source, meta.chunk_id, &e)?;
                            out.push(None);
                        }
                    }
                }
                return Ok(out);
            }
            Ok(raw) => tracing::warn!(
                "{} returned {} embeddings for {} inputs, retrying one by one",
                self.embedder.name(),
                raw.len(),
                batch.len()
            ),
            Err(e) if e.is_structural() => return Err(e),
            Err(e) => tracing::debug!("Batch embedding failed ({e}), retrying one by one"),
        }

        let mut out = Vec::with_capacity(batch.len());
        for (text, meta) in batch.texts.iter().zip(&batch.metas) {
            match safe_embed(self.embedder.as_ref(), text, self.min_split_chars).await {
                Ok(unit) => {
                    failures.success();
                    out.push(Some(unit));
                }
                Err(e) if e.is_structural() => return Err(e),
                Err(e) => {
                    failures.failure(&meta.source, meta.chunk_id, &e)?;
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::tests::word_chunker;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const DIM: usize = 8;

    /// Gives every distinct text its own basis vector.
    #[derive(Default)]
    struct OneHotEmbedder {
        seen: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl Embedder for OneHotEmbedder {
        fn name(&self) -> &str {
            "one-hot"
        }

        fn dimensions(&self) -> usize {
            DIM
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(VtaError::Embedding("rejected".into()));
            }
            if text.contains("zero") {
                return Ok(vec![0.0; DIM]);
            }
            let mut seen = self.seen.lock().unwrap();
            let next = seen.len();
            let slot = *seen.entry(text.to_string()).or_insert(next) % DIM;
            let mut v = vec![0.0; DIM];
            v[slot] = 2.0;
            Ok(v)
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn name(&self) -> &str {
            "down"
        }

        fn dimensions(&self) -> usize {
            DIM
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(VtaError::Http("503 Service Unavailable".into()))
        }
    }

    fn pipeline(embedder: Arc<dyn Embedder>) -> IngestPipeline {
        IngestPipeline::new(word_chunker(4, 1), embedder, ProvenanceRegistry::new()).with_batch_size(2)
    }

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        // 10 words → windows [0..4] [3..7] [6..10]
        std::fs::write(dir.path().join("a.txt"), "a0 a1 a2 a3 a4 a5 a6 a7 a8 a9").unwrap();
        std::fs::write(dir.path().join("b.md"), "# b0 b1").unwrap();
        std::fs::write(dir.path().join("ignored.json"), "{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_end_to_end_query_hits_chunk() {
        let dir = corpus();
        let embedder = Arc::new(OneHotEmbedder::default());
        let mut index = VectorIndex::new(DIM, 0.35).unwrap();

        let report = pipeline(embedder.clone()).ingest_dir(dir.path(), &mut index).await.unwrap();
        assert_eq!(report.files_seen, 2);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.chunks_indexed, 4);
        assert_eq!(index.len(), 4);

        let a_chunks: Vec<&ChunkMetadata> = index
            .entries()
            .iter()
            .map(|e| &e.metadata)
            .filter(|m| m.source.ends_with("a.txt"))
            .collect();
        assert_eq!(a_chunks.iter().map(|m| m.chunk_id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(a_chunks[1].text, "a3 a4 a5 a6");

        let query = normalize(&embedder.embed("a3 a4 a5 a6").await.unwrap()).unwrap();
        let hits = index.search(&query, 3).unwrap();
        assert_eq!(index.metadata(hits[0].position).unwrap().text, "a3 a4 a5 a6");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_chunks_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "fine words").unwrap();
        std::fs::write(dir.path().join("b.txt"), "poison pill").unwrap();
        std::fs::write(dir.path().join("c.txt"), "zero vector").unwrap();
        std::fs::write(dir.path().join("d.txt"), "more fine").unwrap();

        let mut index = VectorIndex::new(DIM, 0.35).unwrap();
        let report = pipeline(Arc::new(OneHotEmbedder::default()))
            .ingest_dir(dir.path(), &mut index)
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 2);
        assert_eq!(report.chunks_skipped, 2);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_consecutive_failures_abort() {
        let dir = corpus();
        let mut index = VectorIndex::new(DIM, 0.35).unwrap();
        let err = pipeline(Arc::new(DownEmbedder))
            .with_max_consecutive_failures(3)
            .ingest_dir(dir.path(), &mut index)
            .await
            .unwrap_err();
        assert!(matches!(err, VtaError::EmbeddingOutage(_)));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_persists_and_rerun_duplicates() {
        let dir = corpus();
        let out = tempfile::tempdir().unwrap();
        let (ip, mp) = (out.path().join("v.index"), out.path().join("meta.json"));
        let p = pipeline(Arc::new(OneHotEmbedder::default()));

        let mut index = VectorIndex::new(DIM, 0.35).unwrap();
        p.ingest(dir.path(), &mut index, &ip, &mp).await.unwrap();
        let loaded = VectorIndex::load(DIM, 0.35, &ip, &mp).unwrap();
        assert_eq!(loaded.len(), 4);

        let mut again = loaded;
        let report = p.ingest(dir.path(), &mut again, &ip, &mp).await.unwrap();
        assert_eq!(report.total_vectors, 8);
    }

    #[tokio::test]
    async fn test_raw_path_locator_without_collections() {
        let dir = corpus();
        let mut index = VectorIndex::new(DIM, 0.35).unwrap();
        pipeline(Arc::new(OneHotEmbedder::default()))
            .ingest_dir(dir.path(), &mut index)
            .await
            .unwrap();
        let expected = dir.path().join("b.md").to_string_lossy().into_owned();
        assert!(index.entries().iter().any(|e| e.metadata.source == expected));
    }

    #[tokio::test]
    async fn test_long_chunks_are_split() {
        struct ShortContext;

        #[async_trait]
        impl Embedder for ShortContext {
            fn name(&self) -> &str {
                "short"
            }
            fn dimensions(&self) -> usize {
                2
            }
            async fn embed(&self, text: &str) -> Result<Vec<f32>> {
                if text.len() > 6 {
                    return Err(VtaError::InputTooLong(format!("{} chars", text.len())));
                }
                Ok(vec![1.0, text.len() as f32])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "abcdefghij klmnopqrst").unwrap();
        let mut index = VectorIndex::new(2, 0.0).unwrap();
        let report = IngestPipeline::new(word_chunker(10, 0), Arc::new(ShortContext), ProvenanceRegistry::new())
            .with_min_split_chars(2)
            .ingest_dir(dir.path(), &mut index)
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 1);
        assert_eq!(index.get(0).unwrap().metadata.text, "abcdefghij klmnopqrst");
    }

    #[tokio::test]
    async fn test_missing_root_and_dimension_checks() {
        let mut index = VectorIndex::new(DIM, 0.35).unwrap();
        let p = pipeline(Arc::new(OneHotEmbedder::default()));
        assert!(matches!(
            p.ingest_dir(Path::new("/definitely/not/here"), &mut index).await,
            Err(VtaError::Io(_))
        ));

        let dir = corpus();
        let mut wrong = VectorIndex::new(DIM + 1, 0.35).unwrap();
        assert!(matches!(
            p.ingest_dir(dir.path(), &mut wrong).await,
            Err(VtaError::Configuration(_))
        ));
    }
}

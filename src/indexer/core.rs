use crate::db::Db;
use crate::db::models::Chunk;
use crate::embedder::Embedder;
use crate::indexer::pdf;
use crate::indexer::splitter::TextSplitter;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

/// Outcome of one [`Indexer::index_pdf`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Pages that contributed text.
    pub pages: usize,
    pub chunks: usize,
    /// The stored copy was already current and nothing was re-embedded.
    pub skipped: bool,
}

/// Key a document is stored under: its path with forward slashes, so the
/// same file gets one key on every platform.
pub fn document_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub struct Indexer<'a, E: Embedder + ?Sized> {
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: &'a E,
    pub splitter: TextSplitter,
    pub batch_size: usize,
    pub show_progress: bool,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(
        db: Arc<TokioMutex<Db>>,
        embedder: &'a E,
        splitter: TextSplitter,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            splitter,
            batch_size: batch_size.max(1),
            show_progress: false,
        }
    }

    /// Draw an embedding progress bar on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Extracts, splits, embeds and stores one PDF.
    ///
    /// Unless `force` is set, a file whose modification time matches the
    /// stored copy is left alone.
    pub async fn index_pdf<P: AsRef<Path>>(&mut self, path: P, force: bool) -> Result<IndexReport> {
        let path = path.as_ref();
        let path_str = document_key(path);

        let metadata = std::fs::metadata(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mod_time: DateTime<Utc> = metadata.modified()?.into();

        if !force {
            let stored = {
                let db_guard = self.db.lock().await;
                db_guard.document_modified_at(&path_str)?
            };
            if stored.is_some_and(|t| t.timestamp() == mod_time.timestamp()) {
                info!(file = %path_str, "index is current, skipping");
                return Ok(IndexReport {
                    skipped: true,
                    ..IndexReport::default()
                });
            }
        }

        let pages = pdf::load_pages(path)?;

        // (page label, chunk text), in reading order
        let pieces: Vec<(&str, String)> = pages
            .iter()
            .flat_map(|page| {
                self.splitter
                    .split(&page.text)
                    .into_iter()
                    .map(move |text| (page.label.as_str(), text))
            })
            .collect();
        if pieces.is_empty() {
            bail!("{} produced no chunks", path.display());
        }
        debug!(pages = pages.len(), chunks = pieces.len(), "split document");

        let vectors = self.embed_all(&pieces).await?;

        let db_chunks: Vec<Chunk> = pieces
            .iter()
            .enumerate()
            .map(|(position, (label, text))| Chunk {
                position,
                content: text.as_str(),
                page_label: Some(*label),
            })
            .collect();

        {
            let mut db_guard = self.db.lock().await;
            db_guard.insert_document(&path_str, mod_time, pages.len(), &db_chunks, &vectors)?;
        }

        info!(
            file = %path_str,
            pages = pages.len(),
            chunks = db_chunks.len(),
            "indexed"
        );
        Ok(IndexReport {
            pages: pages.len(),
            chunks: db_chunks.len(),
            skipped: false,
        })
    }

    async fn embed_all(&self, pieces: &[(&str, String)]) -> Result<Vec<Vec<f32>>> {
        let progress = if self.show_progress {
            let pb = ProgressBar::new(pieces.len() as u64);
            if let Ok(style) =
                ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len} chunks ({eta})")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb.set_message("Embedding");
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(pieces.len());
        for batch in pieces.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|(_, text)| text.as_str()).collect();
            let mut embedded = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("embedding failed")?;
            vectors.append(&mut embedded);
            progress.inc(batch.len() as u64);
        }
        progress.finish_and_clear();

        if vectors.len() != pieces.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            );
        }
        Ok(vectors)
    }
}

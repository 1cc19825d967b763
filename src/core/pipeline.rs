use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::core::hasher::PerceptualHasher;
use crate::core::index::SimilarityIndex;
use crate::core::media::{DecodedItem, HashedItem};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("indexing cancelled")]
    Cancelled,

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexProgress {
    pub items_processed: usize,
    pub total_items: usize,
    pub current_item: String,
}

/// Outcome of one indexing pass. Items that failed to hash are kept (with no
/// fingerprints) so the detector can still group them by checksum.
#[derive(Debug)]
pub struct IndexSummary {
    pub items: Vec<HashedItem>,
    pub failed_items: usize,
}

/// Worker pool that hashes decoded items in parallel and feeds the shared
/// similarity index.
///
/// The index is passed by reference: one instance per scan session, shared
/// across workers, never a process-wide singleton.
pub struct IndexingService {
    hasher: PerceptualHasher,
    worker_threads: usize,
    progress_sender: Option<mpsc::UnboundedSender<IndexProgress>>,
    cancellation_token: Arc<AtomicBool>,
}

impl IndexingService {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            hasher: PerceptualHasher::new(config),
            worker_threads: config.worker_threads.max(1),
            progress_sender: None,
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress_sender(mut self, sender: mpsc::UnboundedSender<IndexProgress>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn get_cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Hash every item and add its fingerprints to `index`.
    ///
    /// A hash failure degrades that one item (logged, counted, kept without
    /// fingerprints); cancellation aborts the whole pass.
    pub fn index_items(
        &self,
        index: &SimilarityIndex,
        items: &[DecodedItem],
    ) -> Result<IndexSummary, PipelineError> {
        if self.cancellation_token.load(Ordering::Relaxed) {
            return Err(PipelineError::Cancelled);
        }

        let total_items = items.len();
        let processed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .build()?;

        let results: Result<Vec<HashedItem>, PipelineError> = pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if self.cancellation_token.load(Ordering::Relaxed) {
                        return Err(PipelineError::Cancelled);
                    }

                    let fingerprints = match self.hasher.hash(&item.image) {
                        Ok(fingerprints) => {
                            for fp in &fingerprints {
                                index.add(&item.item_id, *fp);
                            }
                            log::debug!(
                                "hashed {} ({} fingerprints)",
                                item.item_id,
                                fingerprints.len()
                            );
                            fingerprints
                        }
                        Err(e) => {
                            log::warn!("degrading {}: {}", item.item_id, e);
                            failed.fetch_add(1, Ordering::Relaxed);
                            Vec::new()
                        }
                    };

                    let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    self.send_progress(IndexProgress {
                        items_processed: current,
                        total_items,
                        current_item: item.item_id.clone(),
                    });

                    Ok(HashedItem {
                        item_id: item.item_id.clone(),
                        fingerprints,
                        metadata: item.metadata.clone(),
                    })
                })
                .collect()
        });

        let hashed = results?;
        log::info!(
            "indexed {} items ({} degraded)",
            hashed.len(),
            failed.load(Ordering::Relaxed)
        );
        Ok(IndexSummary {
            items: hashed,
            failed_items: failed.load(Ordering::Relaxed),
        })
    }

    fn send_progress(&self, progress: IndexProgress) {
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(progress);
        }
    }
}

//! LRU cache in front of an embedder, keyed by exact text.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::llm::error::ProviderError;
use crate::memory::embedding::embedder::{EmbedFuture, Embedder};

/// Embedder wrapper that remembers recent vectors.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    /// Wrap `inner`; returns `inner` unchanged when `capacity` is zero.
    #[must_use]
    pub fn wrap(inner: Arc<dyn Embedder>, capacity: usize) -> Arc<dyn Embedder> {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Arc::new(Self {
                inner,
                cache: Mutex::new(LruCache::new(capacity)),
            }),
            None => inner,
        }
    }
}

impl Embedder for CachedEmbedder {
    fn embed_texts(&self, texts: Vec<String>) -> EmbedFuture<'_, Result<Vec<Vec<f32>>, ProviderError>> {
        Box::pin(async move {
            let mut slots: Vec<Option<Vec<f32>>> = {
                let mut cache = self.cache.lock().await;
                texts.iter().map(|text| cache.get(text).cloned()).collect()
            };

            let missing: Vec<String> = texts
                .iter()
                .zip(&slots)
                .filter(|(_, slot)| slot.is_none())
                .map(|(text, _)| text.clone())
                .collect();

            debug!(
                hits = texts.len() - missing.len(),
                misses = missing.len(),
                "embedding cache lookup"
            );

            if !missing.is_empty() {
                let fresh = self.inner.embed_texts(missing.clone()).await?;
                if fresh.len() != missing.len() {
                    return Err(ProviderError::malformed(
                        "embedding",
                        format!("expected {} vectors, got {}", missing.len(), fresh.len()),
                    ));
                }
                let mut cache = self.cache.lock().await;
                let mut fresh = missing.into_iter().zip(fresh);
                for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                    if let Some((text, vector)) = fresh.next() {
                        cache.put(text, vector.clone());
                        *slot = Some(vector);
                    }
                }
            }

            Ok(slots.into_iter().flatten().collect())
        })
    }

    fn ndims(&self) -> usize {
        self.inner.ndims()
    }
}

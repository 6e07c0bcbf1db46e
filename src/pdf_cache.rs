//! Rendered-PDF cache with single-flight rendering.
//!
//! Concurrent requests for the same uncached history share one render.
//! The in-flight map and the artifact store are always locked in that
//! order (in-flight first), so a caller that misses the in-flight map
//! and then re-checks the store can never race a finishing render.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use uuid::Uuid;

use crate::models::PdfArtifact;
use crate::pipeline::history::{HistoryViews, PdfEviction};
use crate::pipeline::rendering::PdfRender;
use crate::pipeline::HistoryError;

/// Storage for rendered artifacts, keyed by history id.
pub trait ArtifactStore: Send + Sync {
    fn load_artifact(&self, history_id: &Uuid) -> Result<Option<PdfArtifact>, HistoryError>;
    /// Insert or replace.
    fn store_artifact(&self, artifact: &PdfArtifact) -> Result<(), HistoryError>;
    /// `true` when an entry was removed.
    fn remove_artifact(&self, history_id: &Uuid) -> Result<bool, HistoryError>;
}

type SharedRender = Shared<BoxFuture<'static, Result<Arc<PdfArtifact>, HistoryError>>>;

struct Flight {
    token: u64,
    result: SharedRender,
}

type InflightMap = Arc<Mutex<HashMap<Uuid, Flight>>>;

pub struct PdfCache {
    views: Arc<dyn HistoryViews>,
    renderer: Arc<dyn PdfRender>,
    store: Arc<dyn ArtifactStore>,
    /// When false every request renders afresh and nothing is stored.
    persist: bool,
    inflight: InflightMap,
    next_token: AtomicU64,
}

fn poisoned() -> HistoryError {
    HistoryError::Persistence("PDF cache lock poisoned".into())
}

impl PdfCache {
    pub fn new(
        views: Arc<dyn HistoryViews>,
        renderer: Arc<dyn PdfRender>,
        store: Arc<dyn ArtifactStore>,
        persist: bool,
    ) -> Self {
        Self {
            views,
            renderer,
            store,
            persist,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
        }
    }

    /// Return the cached PDF for `history_id`, rendering it (once, however
    /// many callers are waiting) when absent.
    pub async fn get_or_generate(&self, history_id: &Uuid) -> Result<PdfArtifact, HistoryError> {
        if self.persist {
            if let Some(artifact) = self.store.load_artifact(history_id)? {
                tracing::debug!(history_id = %history_id, "PDF cache hit");
                return Ok(artifact);
            }
        }

        let flight = {
            let mut inflight = self.inflight.lock().map_err(|_| poisoned())?;
            match inflight.get(history_id) {
                Some(flight) => {
                    tracing::debug!(history_id = %history_id, "Joining in-flight PDF render");
                    flight.result.clone()
                }
                None => {
                    // A render may have settled between the first lookup
                    // and taking the lock.
                    if self.persist {
                        if let Some(artifact) = self.store.load_artifact(history_id)? {
                            return Ok(artifact);
                        }
                    }
                    tracing::debug!(history_id = %history_id, "PDF cache miss, rendering");
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    let result = self.start_render(*history_id, token);
                    inflight.insert(
                        *history_id,
                        Flight {
                            token,
                            result: result.clone(),
                        },
                    );
                    result
                }
            }
        };

        let artifact = flight.await?;
        Ok(PdfArtifact::clone(&artifact))
    }

    /// Drop any stored artifact and forget an in-flight render, so the
    /// next request renders again. Idempotent; returns `true` when there
    /// was something to drop.
    pub fn delete(&self, history_id: &Uuid) -> Result<bool, HistoryError> {
        let mut inflight = self.inflight.lock().map_err(|_| poisoned())?;
        let cancelled = inflight.remove(history_id).is_some();
        let removed = self.store.remove_artifact(history_id)?;
        tracing::debug!(history_id = %history_id, removed, cancelled, "PDF cache entry evicted");
        Ok(removed || cancelled)
    }

    pub fn persists(&self) -> bool {
        self.persist
    }

    fn start_render(&self, history_id: Uuid, token: u64) -> SharedRender {
        let views = self.views.clone();
        let renderer = self.renderer.clone();
        let store = self.store.clone();
        let inflight = self.inflight.clone();
        let persist = self.persist;

        // The blocking task owns the whole render and settles the map
        // itself, so it completes even if every waiter goes away.
        let handle = tokio::task::spawn_blocking({
            let inflight = inflight.clone();
            move || {
                let result = views.view(&history_id).and_then(|view| renderer.render(&view));
                settle(&inflight, store.as_ref(), persist, history_id, token, &result);
                result
            }
        });

        async move {
            match handle.await {
                Ok(result) => result.map(Arc::new),
                Err(e) => {
                    release(&inflight, history_id, token);
                    tracing::error!(history_id = %history_id, error = %e, "PDF render task panicked");
                    Err(HistoryError::Rendering(format!("render task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Remove the flight if it is still the current one for `history_id`.
/// Returns whether it was.
fn release_locked(inflight: &mut HashMap<Uuid, Flight>, history_id: Uuid, token: u64) -> bool {
    if inflight.get(&history_id).is_some_and(|f| f.token == token) {
        inflight.remove(&history_id);
        true
    } else {
        false
    }
}

fn release(inflight: &InflightMap, history_id: Uuid, token: u64) {
    if let Ok(mut map) = inflight.lock() {
        release_locked(&mut map, history_id, token);
    }
}

/// Finish a flight: drop it from the map and, when it is still current
/// and succeeded, store the artifact. A flight that was evicted while
/// rendering is not stored.
fn settle(
    inflight: &InflightMap,
    store: &dyn ArtifactStore,
    persist: bool,
    history_id: Uuid,
    token: u64,
    result: &Result<PdfArtifact, HistoryError>,
) {
    let Ok(mut map) = inflight.lock() else {
        tracing::warn!(history_id = %history_id, "PDF cache lock poisoned, result not cached");
        return;
    };
    let current = release_locked(&mut map, history_id, token);

    match result {
        Ok(artifact) if persist && current => {
            if let Err(e) = store.store_artifact(artifact) {
                tracing::warn!(history_id = %history_id, error = %e, "Failed to cache rendered PDF");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(history_id = %history_id, error = %e, "PDF render failed");
        }
    }
}

impl PdfEviction for PdfCache {
    fn evict(&self, history_id: &Uuid) -> Result<(), HistoryError> {
        self.delete(history_id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryArtifactStore;
    use crate::models::enums::HistoryFormat;
    use crate::models::HistoryView;
    use crate::pipeline::rendering::tests::make_view;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::time::Duration;

    struct OneView(HistoryView);

    impl HistoryViews for OneView {
        fn view(&self, history_id: &Uuid) -> Result<HistoryView, HistoryError> {
            if *history_id == self.0.history.id() {
                Ok(self.0.clone())
            } else {
                Err(HistoryError::not_found("GeneratedHistory", history_id))
            }
        }
    }

    /// Counts renders; optionally fails the first N and sleeps per render.
    struct CountingRenderer {
        renders: AtomicU32,
        fail_first: u32,
        delay: Duration,
        gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl CountingRenderer {
        fn new() -> Self {
            Self {
                renders: AtomicU32::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
                gate: None,
            }
        }

        fn count(&self) -> u32 {
            self.renders.load(Ordering::SeqCst)
        }
    }

    impl PdfRender for CountingRenderer {
        fn render(&self, view: &HistoryView) -> Result<PdfArtifact, HistoryError> {
            let n = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(gate) = &self.gate {
                gate.lock().unwrap().recv().unwrap();
            }
            std::thread::sleep(self.delay);
            if n <= self.fail_first {
                return Err(HistoryError::Rendering("template defect".into()));
            }
            Ok(PdfArtifact {
                history_id: view.history.id(),
                filename: format!("render-{n}.pdf"),
                bytes: format!("%PDF-{n}").into_bytes(),
            })
        }
    }

    struct Fixture {
        cache: Arc<PdfCache>,
        renderer: Arc<CountingRenderer>,
        store: Arc<MemoryArtifactStore>,
        id: Uuid,
    }

    fn fixture(renderer: CountingRenderer, persist: bool) -> Fixture {
        let view = make_view("# Historia", HistoryFormat::Markdown);
        let id = view.history.id();
        let renderer = Arc::new(renderer);
        let store = Arc::new(MemoryArtifactStore::new());
        let cache = Arc::new(PdfCache::new(
            Arc::new(OneView(view)),
            renderer.clone(),
            store.clone(),
            persist,
        ));
        Fixture {
            cache,
            renderer,
            store,
            id,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_render() {
        let mut renderer = CountingRenderer::new();
        renderer.delay = Duration::from_millis(100);
        let f = fixture(renderer, true);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = f.cache.clone();
                let id = f.id;
                tokio::spawn(async move { cache.get_or_generate(&id).await })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        assert_eq!(f.renderer.count(), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(f.store.load_artifact(&f.id).unwrap(), Some(results[0].clone()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cached_artifact_is_returned_unchanged() {
        let f = fixture(CountingRenderer::new(), true);
        let first = f.cache.get_or_generate(&f.id).await.unwrap();
        let second = f.cache.get_or_generate(&f.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.renderer.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_then_get_renders_again() {
        let f = fixture(CountingRenderer::new(), true);
        let first = f.cache.get_or_generate(&f.id).await.unwrap();

        assert!(f.cache.delete(&f.id).unwrap());
        assert!(!f.cache.delete(&f.id).unwrap());
        assert!(f.store.is_empty());

        let second = f.cache.get_or_generate(&f.id).await.unwrap();
        assert_eq!(f.renderer.count(), 2);
        assert_ne!(first.bytes, second.bytes);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_render_does_not_block_the_next_attempt() {
        let mut renderer = CountingRenderer::new();
        renderer.fail_first = 1;
        let f = fixture(renderer, true);

        let err = f.cache.get_or_generate(&f.id).await.unwrap_err();
        assert!(matches!(err, HistoryError::Rendering(_)));
        assert!(f.store.is_empty());

        let artifact = f.cache.get_or_generate(&f.id).await.unwrap();
        assert_eq!(artifact.bytes, b"%PDF-2");
        assert_eq!(f.renderer.count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn without_persistence_every_request_renders() {
        let f = fixture(CountingRenderer::new(), false);
        f.cache.get_or_generate(&f.id).await.unwrap();
        f.cache.get_or_generate(&f.id).await.unwrap();
        assert_eq!(f.renderer.count(), 2);
        assert!(f.store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_history_is_not_found() {
        let f = fixture(CountingRenderer::new(), true);
        let err = f.cache.get_or_generate(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, HistoryError::NotFound { .. }));
        assert_eq!(f.renderer.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn eviction_during_render_skips_storing() {
        let (tx, rx) = mpsc::channel();
        let mut renderer = CountingRenderer::new();
        renderer.gate = Some(Mutex::new(rx));
        let f = fixture(renderer, true);

        let task = {
            let cache = f.cache.clone();
            let id = f.id;
            tokio::spawn(async move { cache.get_or_generate(&id).await })
        };
        while f.renderer.count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        f.cache.evict(&f.id).unwrap();
        tx.send(()).unwrap();

        assert!(task.await.unwrap().is_ok());
        assert!(f.store.load_artifact(&f.id).unwrap().is_none());
    }
}

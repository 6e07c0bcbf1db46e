//! Shared types for the history API layer.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::config::AppConfig;
use crate::db::{MemoryArtifactStore, SqliteStore};
use crate::pdf_cache::{ArtifactStore, PdfCache};
use crate::pipeline::generation::GenerationClient;
use crate::pipeline::history::{HistoryOrchestrator, HistoryReader};
use crate::pipeline::rendering::DocumentRenderer;

/// Header carrying the authenticated user's id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

// ═══════════════════════════════════════════════════════════
// API context: shared state for the history router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<HistoryOrchestrator>,
    pub renderer: Arc<DocumentRenderer>,
    pub pdf_cache: Arc<PdfCache>,
}

impl ApiContext {
    pub fn new(
        orchestrator: Arc<HistoryOrchestrator>,
        renderer: Arc<DocumentRenderer>,
        pdf_cache: Arc<PdfCache>,
    ) -> Self {
        Self {
            orchestrator,
            renderer,
            pdf_cache,
        }
    }

    /// Wire the pipeline on top of one SQLite store.
    ///
    /// Rendered PDFs go to the `pdf_artifacts` table when caching is
    /// enabled, otherwise to a throwaway in-memory store that the cache
    /// never writes to.
    pub fn from_store(
        store: Arc<SqliteStore>,
        client: Arc<dyn GenerationClient>,
        config: &AppConfig,
    ) -> Self {
        let renderer = Arc::new(DocumentRenderer::new(&config.render));
        let artifacts: Arc<dyn ArtifactStore> = if config.cache.persist_pdfs {
            store.clone()
        } else {
            Arc::new(MemoryArtifactStore::new())
        };

        let reader = Arc::new(HistoryReader::new(store.clone(), store.clone()));
        let pdf_cache = Arc::new(PdfCache::new(
            reader,
            renderer.clone(),
            artifacts,
            config.cache.persist_pdfs,
        ));

        let orchestrator = Arc::new(HistoryOrchestrator::new(
            store.clone(),
            store.clone(),
            store,
            client,
            pdf_cache.clone(),
            config.generation.settings(),
        ));

        Self::new(orchestrator, renderer, pdf_cache)
    }
}

// ═══════════════════════════════════════════════════════════
// Requesting user: taken from the X-User-Id header
// ═══════════════════════════════════════════════════════════

/// Id of the user on whose behalf the request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestingUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for RequestingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::BadRequest("Missing X-User-Id header".into()))?
            .to_str()
            .map_err(|_| ApiError::BadRequest("Malformed X-User-Id header".into()))?;

        Uuid::parse_str(raw.trim())
            .map(RequestingUser)
            .map_err(|_| ApiError::BadRequest("Malformed X-User-Id header".into()))
    }
}

/// Parse a path segment as a UUID, rejecting with 400 instead of axum's
/// plain-text rejection.
pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid ID format: {raw}")))
}

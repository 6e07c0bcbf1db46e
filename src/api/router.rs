//! History API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use axum::routing::{delete, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the history API router.
pub fn history_api_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/patients/:patient_id/histories",
            get(endpoints::histories::list).post(endpoints::histories::generate),
        )
        .route(
            "/histories/:id",
            get(endpoints::histories::detail).delete(endpoints::histories::delete),
        )
        .route("/histories/:id/pdf", get(endpoints::documents::pdf))
        .route("/histories/:id/preview", get(endpoints::documents::preview))
        .route(
            "/histories/:id/pdf-cache",
            delete(endpoints::documents::evict_pdf),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

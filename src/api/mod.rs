//! HTTP surface for the history pipeline.
//!
//! `history_api_router()` returns a composable `Router` with every route
//! nested under `/api/`. Authentication happens upstream; the caller's
//! id arrives in the `X-User-Id` header.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::history_api_router;
pub use server::{start_server, HistoryApiServer};
pub use types::ApiContext;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Caller identity extraction.
pub mod caller;
/// Health check route.
pub mod health;
/// Session lobby and game routes.
pub mod sessions;
/// Server-sent event streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and the Swagger UI under `/docs`.
pub fn router(state: SharedState) -> Router<()> {
    let docs: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    health::router()
        .merge(sse::router())
        .merge(sessions::router())
        .merge(docs)
        .with_state(state)
}

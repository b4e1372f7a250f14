use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
}

impl HealthResponse {
    /// Storage answered.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// Storage did not answer its health check.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}

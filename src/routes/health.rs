use axum::response::Json;
use serde::Serialize;

use super::ApiResponse;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_version() {
        let Json(resp) = health_check().await;
        assert!(resp.code);
        let data = resp.data.unwrap();
        assert_eq!(data.status, "healthy");
        assert_eq!(data.version, env!("CARGO_PKG_VERSION"));
    }
}

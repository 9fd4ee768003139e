use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/health", get(get_health))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "checked_at": Utc::now(),
        "started_at": state.started_at,
        "store": state.store_backend,
        "conversations": state.conversations.len(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::server::{AppState, build_router};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use eco_forms::{FormConfig, MemoryReportStore};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_reports_store_and_conversation_count() {
        let state = Arc::new(AppState::new(
            Arc::new(MemoryReportStore::new()),
            FormConfig::default(),
        ));
        state.conversations.get_or_create("c1");
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("response json");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "memory");
        assert_eq!(json["conversations"], 1);
    }
}

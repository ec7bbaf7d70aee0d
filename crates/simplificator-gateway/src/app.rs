use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use simplificator_agent::provider::LlmProvider;
use simplificator_agent::review::Reviewer;
use simplificator_core::SimplificatorConfig;
use simplificator_reviews::ReviewStore;
use tower_http::cors::{Any, CorsLayer};

/// Central shared state, passed as Arc<AppState> to all handlers.
pub struct AppState {
    pub config: SimplificatorConfig,
    /// Answers `/chat`: the upstream gateway, or the scripted advisor.
    pub provider: Arc<dyn LlmProvider>,
    /// None when no upstream is configured.
    pub reviewer: Option<Reviewer>,
    pub reviews: ReviewStore,
}

impl AppState {
    pub fn new(
        config: SimplificatorConfig,
        provider: Arc<dyn LlmProvider>,
        reviewer: Option<Reviewer>,
        reviews: ReviewStore,
    ) -> Self {
        Self {
            config,
            provider,
            reviewer,
            reviews,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/review", post(crate::http::review::review_handler))
        .route("/reviews", get(crate::http::review::list_reviews))
        .route("/reviews/stats", get(crate::http::review::review_stats))
        .route("/reviews/{id}", get(crate::http::review::get_review))
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_reports_provider() {
        let app = build_router(test_support::state(None));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["upstream"], "scripted");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_support::state(None));
        let resp = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use simplificator_agent::provider::ProviderError;
use simplificator_agent::review::{ReviewFallback, ReviewRequest, ReviewVerdict};
use simplificator_core::config::MAX_REVIEW_LIST;
use simplificator_core::{ScoreBand, SimplificatorError};
use simplificator_reviews::{NewReview, Review, ReviewStats};
use tracing::{info, warn};

use super::{api_error, ApiError};
use crate::app::AppState;

const DEFAULT_REVIEW_LIST: usize = 50;

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    #[serde(flatten)]
    pub verdict: ReviewVerdict,
    pub band: ScoreBand,
    pub label: &'static str,
    pub marker: &'static str,
    /// Id of the stored review; absent when saving failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub saved: bool,
}

#[derive(Debug, Serialize)]
pub struct FallbackBody {
    pub error: String,
    #[serde(flatten)]
    pub verdict: ReviewVerdict,
}

/// POST /review: score a submission and store the result.
pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReviewRequest>,
) -> Result<Response, ApiError> {
    req.validate(&state.config.review).map_err(api_error)?;

    let result = match state.reviewer {
        Some(ref reviewer) => reviewer.review(&req).await,
        None => Err(ProviderError::Unavailable(
            "no upstream API key configured".into(),
        )),
    };

    let verdict = match result {
        Ok(verdict) => verdict,
        Err(e) => {
            let fallback = ReviewFallback::from_error(&e);
            warn!(error = %e, status = fallback.status, "review failed, returning fallback verdict");
            let status =
                StatusCode::from_u16(fallback.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = FallbackBody {
                error: fallback.error,
                verdict: fallback.verdict,
            };
            return Ok((status, Json(body)).into_response());
        }
    };

    let saved = state.reviews.insert(NewReview {
        title: verdict.title.clone(),
        code_snippet: req.code.clone(),
        description: req.description.clone(),
        score: verdict.score,
        suggestions: verdict.suggestions.clone(),
    });
    let id = match saved {
        Ok(review) => {
            info!(id = %review.id, score = review.score, "review saved");
            Some(review.id)
        }
        Err(e) => {
            warn!(error = %e, "review scored but could not be saved");
            None
        }
    };

    let band = verdict.band();
    Ok(Json(ReviewResponse {
        verdict,
        band,
        label: band.label(),
        marker: band.marker(),
        saved: id.is_some(),
        id,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// GET /reviews?limit=N: newest first.
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_REVIEW_LIST)
        .min(MAX_REVIEW_LIST);
    let reviews = state
        .reviews
        .list_recent(limit)
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(reviews))
}

/// GET /reviews/stats: totals and score trend over all stored reviews.
pub async fn review_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReviewStats>, ApiError> {
    let reviews = state
        .reviews
        .list_recent(usize::MAX)
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(ReviewStats::from_reviews(&reviews)))
}

/// GET /reviews/{id}
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Review>, ApiError> {
    match state.reviews.get(&id).map_err(|e| api_error(e.into()))? {
        Some(review) => Ok(Json(review)),
        None => Err(api_error(SimplificatorError::NotFound(format!(
            "review {id}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use simplificator_agent::advisor::ScriptedProvider;
    use simplificator_agent::provider::{
        ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall,
    };
    use simplificator_agent::review::Reviewer;
    use simplificator_core::config::ReviewConfig;
    use tower::ServiceExt;

    use crate::app::{build_router, test_support};

    /// Always calls the review tool with fixed arguments.
    struct FixedVerdict;

    #[async_trait]
    impl LlmProvider for FixedVerdict {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: String::new(),
                model: "fixed".into(),
                stop_reason: "tool_calls".into(),
                tool_calls: vec![ToolCall {
                    name: "provide_review".into(),
                    arguments: r#"{"score":8,"title":"Kafka for a Todo App","suggestions":["Use one Postgres table"]}"#.into(),
                }],
            })
        }
    }

    /// Answers every call with a rate limit.
    struct Throttled;

    #[async_trait]
    impl LlmProvider for Throttled {
        fn name(&self) -> &str {
            "throttled"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::RateLimited { retry_after_ms: 1000 })
        }
    }

    fn reviewer(provider: impl LlmProvider + 'static) -> Option<Reviewer> {
        Some(Reviewer::new(Arc::new(provider), "m", 64, ReviewConfig::default()))
    }

    fn post_review(body: serde_json::Value) -> Request<Body> {
        Request::post("/review")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn blank_code_is_bad_request() {
        let app = build_router(test_support::state(None));
        let resp = app
            .oneshot(post_review(serde_json::json!({"code": " ", "description": "todo app"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_upstream_returns_fallback_verdict() {
        let app = build_router(test_support::state(None));
        let resp = app
            .oneshot(post_review(
                serde_json::json!({"code": "kafka", "description": "todo app"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["score"], 5);
        assert_eq!(body["title"], "Error analyzing code");
        assert!(body["error"].as_str().unwrap().contains("no upstream"));
    }

    #[tokio::test]
    async fn model_without_tool_call_falls_back() {
        // The scripted advisor never calls tools.
        let app = build_router(test_support::state(reviewer(ScriptedProvider::default())));
        let resp = app
            .oneshot(post_review(
                serde_json::json!({"code": "kafka", "description": "todo app"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn scored_review_is_saved_and_listed() {
        let app = build_router(test_support::state(reviewer(FixedVerdict)));
        let resp = app
            .clone()
            .oneshot(post_review(
                serde_json::json!({"code": "kafka + k8s", "description": "todo app"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["score"], 8);
        assert_eq!(body["band"], "over_engineered");
        assert_eq!(body["label"], "Over-engineered");
        assert_eq!(body["saved"], true);
        let id = body["id"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(Request::get("/reviews").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let list = test_support::body_json(resp).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["code_snippet"], "kafka + k8s");

        let resp = app
            .oneshot(Request::get(format!("/reviews/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_maps_to_429_fallback() {
        let app = build_router(test_support::state(reviewer(Throttled)));
        let resp = app
            .oneshot(post_review(
                serde_json::json!({"code": "kafka", "description": "todo app"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = test_support::body_json(resp).await;
        assert_eq!(body["title"], "Rate Limited");
    }

    #[tokio::test]
    async fn empty_store_lists_and_stats() {
        let state = test_support::state(None);
        let app = build_router(Arc::clone(&state));

        let resp = app
            .clone()
            .oneshot(Request::get("/reviews?limit=500").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test_support::body_json(resp).await, serde_json::json!([]));

        let resp = app
            .clone()
            .oneshot(Request::get("/reviews/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stats = test_support::body_json(resp).await;
        assert_eq!(stats["total"], 0);
        assert_eq!(stats["trend"], "none");

        let resp = app
            .oneshot(Request::get("/reviews/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

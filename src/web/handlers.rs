//! HTTP request handlers.

use super::AppState;
use crate::db::{Comment, CommentKey, Config, MetricResult, Repository, StoreError};
use crate::ingest;
use crate::reconcile::reconcile_atomic;
use crate::time::TimeDetail;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

fn store_error(e: StoreError) -> Response {
    let status = match &e {
        StoreError::DuplicateKey(_) => StatusCode::CONFLICT,
        StoreError::ConstraintViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Corrupt(_) | StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    }
    (status, e.to_string()).into_response()
}

fn found<T: Serialize>(value: Option<T>, what: &str) -> Response {
    match value {
        Some(v) => Json(v).into_response(),
        None => (StatusCode::NOT_FOUND, format!("{what} not found")).into_response(),
    }
}

pub async fn handle_health() -> impl IntoResponse {
    "ok"
}

// ============================================================================
// API: Config
// ============================================================================

pub async fn handle_apply_config(State(state): State<AppState>, Json(cfg): Json<Config>) -> Response {
    match reconcile_atomic(&state.store, &cfg) {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => store_error(e),
    }
}

// ============================================================================
// API: Systems, components, metrics
// ============================================================================

pub async fn handle_list_systems(State(state): State<AppState>) -> Response {
    match state.store.list_systems() {
        Ok(systems) => Json(systems).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_get_system(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get_system(&id) {
        Ok(system) => found(system, "system"),
        Err(e) => store_error(e),
    }
}

pub async fn handle_list_system_components(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.list_components_by_system(&id) {
        Ok(components) => Json(components).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_get_component(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let component = match state.store.get_component(&id) {
        Ok(Some(c)) => c,
        Ok(None) => return found(None::<()>, "component"),
        Err(e) => return store_error(e),
    };

    match state.store.list_metrics_by_component(&id) {
        Ok(metrics) => Json(crate::db::Component { metrics, ..component }).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_list_metrics(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.list_metrics_by_component(&id) {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => store_error(e),
    }
}

// ============================================================================
// API: Results
// ============================================================================

pub async fn handle_list_results(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.list_results_by_component(&id) {
        Ok(results) => Json(results).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_insert_result(State(state): State<AppState>, Json(result): Json<MetricResult>) -> Response {
    match ingest::insert_result(&state.store, &result) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneQuery {
    pub older_than: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PruneResponse {
    pub deleted: usize,
    pub interval: String,
}

pub async fn handle_prune_results(State(state): State<AppState>, Query(query): Query<PruneQuery>) -> Response {
    let older_than = match TimeDetail::parse(&query.older_than) {
        Ok(t) => t,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match ingest::prune_outdated_results(&state.store, &older_than) {
        Ok(deleted) => Json(PruneResponse {
            deleted,
            interval: older_than.to_interval_expression(),
        })
        .into_response(),
        Err(e) => store_error(e),
    }
}

// ============================================================================
// API: Comments
// ============================================================================

pub async fn handle_list_comments(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.list_comments_by_component(&id) {
        Ok(comments) => Json(comments).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_delete_component_comments(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match ingest::delete_comments_for_component(&state.store, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_insert_comment(State(state): State<AppState>, Json(comment): Json<Comment>) -> Response {
    match ingest::insert_comment(&state.store, &comment) {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub old: Comment,
    pub new: Comment,
}

pub async fn handle_update_comment(State(state): State<AppState>, Json(req): Json<UpdateCommentRequest>) -> Response {
    match ingest::update_comment(&state.store, &req.old, &req.new) {
        Ok(()) => Json(req.new).into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn handle_delete_comment(State(state): State<AppState>, Json(key): Json<CommentKey>) -> Response {
    match ingest::delete_comment(&state.store, &key.component_id, &key.metric_id, key.timestamp) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ServerConfig;
    use crate::db::{Repository, Store};
    use crate::reconcile::ReconcileSummary;
    use crate::test_support::*;
    use crate::web::{PruneResponse, Server};

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn app() -> (Router, Store) {
        let store = Store::open_in_memory().unwrap();
        (Server::new(ServerConfig::default(), store.clone()).router(), store)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn config_doc() -> Value {
        json!({
            "version": "1",
            "systems": [{"id": "s1", "name": "Core", "ref": "r1"}],
            "components": [{
                "id": "c1", "name": "API", "baseUrl": "http://api", "systemId": "s1", "ref": "rc1",
                "metrics": [{"id": "m1", "endpoint": "/health", "frequency": "30s",
                             "expectedTime": "200ms", "timeout": "5s", "deleteAfter": "7d"}]
            }]
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = app();
        let res = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_apply_config_and_read_back() {
        let (app, store) = app();

        let res = app
            .clone()
            .oneshot(json_request("POST", "/api/config", config_doc()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let summary: ReconcileSummary = body_json(res).await;
        assert_eq!(summary.metrics_inserted, 1);

        let res = app.clone().oneshot(get("/api/components/c1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let component: Value = body_json(res).await;
        assert_eq!(component["systemId"], "s1");
        assert_eq!(component["metrics"][0]["frequency"], "30s");

        let res = app.clone().oneshot(get("/api/systems/nope")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        assert_eq!(store.list_components_by_system("s1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_config_is_rolled_back() {
        let (app, store) = app();
        let mut doc = config_doc();
        doc["components"][0]["systemId"] = json!("missing");

        let res = app.oneshot(json_request("POST", "/api/config", doc)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(store.get_system("s1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_duration_is_rejected() {
        let (app, store) = app();
        let mut doc = config_doc();
        doc["components"][0]["metrics"][0]["timeout"] = json!("5 seconds");

        let res = app.oneshot(json_request("POST", "/api/config", doc)).await.unwrap();
        assert!(res.status().is_client_error());
        assert!(store.list_systems().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_comment_lifecycle() {
        let (app, store) = app();
        let ts = Utc::now();
        let comment = comment_for("c1", "m1", "deploying", ts);
        let body = serde_json::to_value(&comment).unwrap();

        let res = app.clone().oneshot(json_request("POST", "/api/comments", body.clone())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app.clone().oneshot(json_request("POST", "/api/comments", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let updated = comment_for("c1", "m1", "deployed", ts + ChronoDuration::minutes(1));
        let res = app
            .clone()
            .oneshot(json_request("PUT", "/api/comments", json!({"old": comment, "new": updated})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(store.list_comments_by_component("c1").unwrap(), vec![updated.clone()]);

        let key = serde_json::to_value(updated.key()).unwrap();
        let res = app.clone().oneshot(json_request("DELETE", "/api/comments", key)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(store.list_comments_by_component("c1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_insert_and_prune() {
        let (app, store) = app();
        let old = result_for("c1", "m1", Utc::now() - ChronoDuration::hours(1));
        let fresh = result_for("c1", "m1", Utc::now());

        for r in [&old, &fresh] {
            let res = app
                .clone()
                .oneshot(json_request("POST", "/api/results", serde_json::to_value(r).unwrap()))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/results?olderThan=45m")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let pruned: PruneResponse = body_json(res).await;
        assert_eq!(pruned.deleted, 1);
        assert_eq!(pruned.interval, "45 minutes");
        assert_eq!(store.list_results_by_component("c1").unwrap().len(), 1);

        let res = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/results?olderThan=45x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}

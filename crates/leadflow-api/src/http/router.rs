//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Flow definitions
        .route(
            "/flows",
            get(handlers::flow::list_flows).post(handlers::flow::save_flow),
        )
        .route(
            "/flows/{id}",
            get(handlers::flow::get_flow).delete(handlers::flow::delete_flow),
        )
        .route("/flows/{id}/run", post(handlers::flow::run_flow))
        // Form submissions
        .route("/contacts", post(handlers::contact::submit_contact))
        // Executions
        .route("/executions", get(handlers::execution::list_executions))
        .route(
            "/executions/stats",
            get(handlers::execution::execution_stats),
        )
        .route("/executions/{id}", get(handlers::execution::get_execution))
        .route(
            "/executions/{id}/steps",
            get(handlers::execution::list_steps),
        )
        .route(
            "/executions/{id}/retry",
            post(handlers::execution::retry_execution),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn welcome_flow() -> Value {
        let trigger = Uuid::now_v7();
        let email = Uuid::now_v7();
        json!({
            "name": "Welcome",
            "nodes": [
                { "id": trigger, "type": "trigger", "subtype": "form_submit" },
                {
                    "id": email,
                    "type": "action",
                    "subtype": "send_email",
                    "data": { "subject": "Hi {{name}}", "body": "Thanks for reaching out." }
                }
            ],
            "edges": [
                { "id": Uuid::now_v7(), "source_node_id": trigger, "target_node_id": email }
            ]
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = build_router(AppState::for_tests().await);
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn saved_flow_is_listed_and_fetched() {
        let router = build_router(AppState::for_tests().await);

        let (status, body) = call(&router, "POST", "/api/v1/flows", Some(welcome_flow())).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&router, "GET", "/api/v1/flows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(&router, "GET", &format!("/api/v1/flows/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(body["_links"]["self"], format!("/api/v1/flows/{id}"));
    }

    #[tokio::test]
    async fn invalid_flow_is_rejected() {
        let router = build_router(AppState::for_tests().await);
        let mut flow = welcome_flow();
        flow["nodes"][1]["data"] = json!({ "subject": "Hi" });

        let (status, body) = call(&router, "POST", "/api/v1/flows", Some(flow)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_flow_is_not_found() {
        let router = build_router(AppState::for_tests().await);
        let uri = format!("/api/v1/flows/{}", Uuid::now_v7());

        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "FLOW_NOT_FOUND");

        let (status, _) = call(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn contact_submission_runs_form_flow() {
        let router = build_router(AppState::for_tests().await);
        call(&router, "POST", "/api/v1/flows", Some(welcome_flow())).await;

        let (status, body) = call(
            &router,
            "POST",
            "/api/v1/contacts",
            Some(json!({ "name": "Ann Lee", "email": "ANN@gmail.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["contact"]["email"], "ann@gmail.com");
        assert_eq!(body["data"]["run"]["status"], "completed");

        let execution_id = body["data"]["run"]["execution_id"].as_str().unwrap().to_string();
        let (status, body) = call(
            &router,
            "GET",
            &format!("/api/v1/executions/{execution_id}/steps"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let steps = body["data"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s["status"] == "completed"));

        let (_, body) = call(&router, "GET", "/api/v1/executions/stats?days=3", None).await;
        assert_eq!(body["data"]["total_executions"], 1);
        assert_eq!(body["data"]["successful_executions"], 1);
        assert_eq!(body["data"]["recent_executions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_contact_returns_field_errors() {
        let router = build_router(AppState::for_tests().await);
        let (status, body) = call(
            &router,
            "POST",
            "/api/v1/contacts",
            Some(json!({ "name": "Ann", "email": "not-an-email" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["details"][0]["field"], "email");
    }

    #[tokio::test]
    async fn completed_execution_cannot_be_retried() {
        let router = build_router(AppState::for_tests().await);
        let (_, body) = call(&router, "POST", "/api/v1/flows", Some(welcome_flow())).await;
        let flow_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/v1/flows/{flow_id}/run"),
            Some(json!({ "name": "Bob", "email": "bob@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let execution_id = body["data"]["execution_id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &router,
            "POST",
            &format!("/api/v1/executions/{execution_id}/retry"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "NOT_RETRYABLE");

        let (status, body) = call(
            &router,
            "GET",
            &format!("/api/v1/executions?flow_id={flow_id}&status=completed"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let router = build_router(AppState::for_tests().await);
        let (status, _) = call(
            &router,
            "GET",
            &format!("/api/v1/executions/{}", Uuid::now_v7()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use spendlens_core::test_utils::{household_ledger, short_ledger, MockOllamaServer};
use tower::ServiceExt;

fn setup_test_app() -> Router {
    create_router_with_options(AnalysisConfig::default(), ServerConfig::default(), None)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Upload an 8-month household ledger and return the session id
async fn create_household_session(app: &Router) -> String {
    let ledger = household_ledger(8);
    let body = serde_json::json!({ "transactions": ledger.transactions() });
    let response = app
        .clone()
        .oneshot(post_json("/api/sessions", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    json["session_id"].as_str().unwrap().to_string()
}

// ========== Health ==========

#[tokio::test]
async fn test_health() {
    let app = setup_test_app();

    let response = app.oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["narration"], false);
}

// ========== Session API Tests ==========

#[tokio::test]
async fn test_create_session_from_json() {
    let app = setup_test_app();
    let ledger = household_ledger(8);
    let body = serde_json::json!({ "transactions": ledger.transactions() });

    let response = app.oneshot(post_json("/api/sessions", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["session_id"].as_str().unwrap().starts_with("sl_"));
    assert_eq!(json["profile"]["transaction_count"], 72);
    assert_eq!(json["profile"]["months_count"], 8);
}

#[tokio::test]
async fn test_create_session_from_csv() {
    let app = setup_test_app();
    let csv = "date,description,amount,category\n\
               2024-01-05,NETFLIX,15.49,Subscriptions\n\
               2024-02-05,NETFLIX,15.49,Subscriptions\n\
               2024-01-09,GREEN MARKET,\"$1,210.00\",Groceries\n";

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions/csv")
                .header("content-type", "text/csv")
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["profile"]["transaction_count"], 3);
}

#[tokio::test]
async fn test_create_session_rejects_bad_input() {
    let app = setup_test_app();

    let empty = app
        .clone()
        .oneshot(post_json("/api/sessions", serde_json::json!({ "transactions": [] })))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let bad_csv = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions/csv")
                .body(Body::from("when,what\n2024-01-01,coffee\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad_csv.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(bad_csv).await;
    assert!(json["error"].as_str().unwrap().contains("date"));
}

#[tokio::test]
async fn test_get_and_delete_session() {
    let app = setup_test_app();
    let id = create_household_session(&app).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["transaction_count"], 72);
    assert_eq!(json["analyzed"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/sessions/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["deleted"], true);

    let response = app
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = setup_test_app();

    let response = app
        .oneshot(post_json("/api/sessions/sl_nope/analyze", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Session not found");
}

#[tokio::test]
async fn test_expired_session_is_gone() {
    let config = ServerConfig {
        session_timeout: std::time::Duration::ZERO,
        ..Default::default()
    };
    let app = create_router_with_options(AnalysisConfig::default(), config, None);
    let id = create_household_session(&app).await;

    let response = app
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Session expired");
}

// ========== Analysis API Tests ==========

#[tokio::test]
async fn test_analyze_session() {
    let app = setup_test_app();
    let id = create_household_session(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/sessions/{}/analyze", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["tools_run"].as_array().unwrap().len(), 5);
    assert!(json["results"]["subscription_hunter"]["recurring"].is_array());
    assert!(json["results"]["financial_resilience"].is_object());
    assert!(json["execution_time"].is_number());
    assert!(json["insights"].as_array().unwrap().len() <= 5);

    let response = app
        .oneshot(get(&format!("/api/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(get_body_json(response).await["analyzed"], true);
}

#[tokio::test]
async fn test_short_ledger_reports_skips() {
    let app = setup_test_app();
    let ledger = short_ledger(40);
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/sessions",
            serde_json::json!({ "transactions": ledger.transactions() }),
        ))
        .await
        .unwrap();
    let id = get_body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(post_json(
            &format!("/api/sessions/{}/analyze", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let json = get_body_json(response).await;
    let skipped = json["tools_skipped"].as_array().unwrap();
    assert!(skipped
        .iter()
        .any(|s| s["name"] == "correlation_engine" && !s["reason"].as_str().unwrap().is_empty()));
}

#[tokio::test]
async fn test_stream_session_emits_steps_then_done() {
    let app = setup_test_app();
    let id = create_household_session(&app).await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/sessions/{}/analyze/stream", id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let body = get_body_text(response).await;
    let events: Vec<serde_json::Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect();

    assert_eq!(
        events[0]["step"],
        "Profiled 72 transactions across 8 months"
    );
    let last = events.last().unwrap();
    assert_eq!(last["done"], true);
    assert_eq!(last["data"]["tools_run"].as_array().unwrap().len(), 5);

    // the streamed run is stored, so questions work without a blocking call
    let response = app
        .oneshot(post_json(
            &format!("/api/sessions/{}/ask", id),
            serde_json::json!({ "question": "What if I cancel Netflix?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ========== Ask API Tests ==========

#[tokio::test]
async fn test_ask_requires_analysis() {
    let app = setup_test_app();
    let id = create_household_session(&app).await;

    let response = app
        .oneshot(post_json(
            &format!("/api/sessions/{}/ask", id),
            serde_json::json!({ "question": "What if I cancel Netflix?" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ask_after_analysis() {
    let app = setup_test_app();
    let id = create_household_session(&app).await;
    app.clone()
        .oneshot(post_json(
            &format!("/api/sessions/{}/analyze", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/sessions/{}/ask", id),
            serde_json::json!({ "question": "What if I cancel Netflix?" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["tool_used"], "simulate_cancellation");
    assert_eq!(json["fallback"], false);
    assert_eq!(json["answer_payload"]["annual_savings"], 185.88);
    assert_eq!(json["answer"], "Cancelling NETFLIX frees up about $186 a year.");

    let response = app
        .oneshot(post_json(
            &format!("/api/sessions/{}/ask", id),
            serde_json::json!({ "question": "What is the meaning of life?" }),
        ))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert_eq!(json["tool_used"], "none");
    assert_eq!(json["fallback"], true);
}

#[tokio::test]
async fn test_ask_with_narration() {
    let mock = MockOllamaServer::start_with_reply("NETFLIX costs $185.88 a year.").await;
    let narrator: Arc<dyn spendlens_core::Narrator> =
        Arc::new(OllamaNarrator::new(&mock.url(), "llama3.2"));
    let app = create_router_with_options(
        AnalysisConfig::default(),
        ServerConfig::default(),
        Some(narrator),
    );
    let id = create_household_session(&app).await;
    app.clone()
        .oneshot(post_json(
            &format!("/api/sessions/{}/analyze", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/sessions/{}/ask", id),
            serde_json::json!({ "question": "What if I cancel Netflix?", "narrate": true }),
        ))
        .await
        .unwrap();

    let json = get_body_json(response).await;
    assert_eq!(json["answer"], "NETFLIX costs $185.88 a year.");
    assert_eq!(json["answer_payload"]["annual_savings"], 185.88);
}

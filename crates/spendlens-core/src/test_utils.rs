//! Test utilities for spendlens-core
//!
//! Deterministic synthetic ledgers for exercising the engine, and a mock
//! Ollama server for the narration collaborator.

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::models::{Ledger, Transaction};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Month `offset` months after January 2024
fn month_start(offset: u32) -> (i32, u32) {
    (2024 + (offset / 12) as i32, 1 + offset % 12)
}

/// A steady household: salary, rent, groceries, dining, shopping and two
/// streaming services, over `months` months from January 2024
pub fn household_ledger(months: u32) -> Ledger {
    let mut txs = vec![];
    for m in 0..months {
        let (y, mo) = month_start(m);
        txs.push(Transaction::new(date(y, mo, 1), "ACME PAYROLL", 4500.0, "Income"));
        txs.push(Transaction::new(date(y, mo, 2), "OAK STREET APARTMENTS", 1600.0, "Rent & Housing"));
        txs.push(Transaction::new(date(y, mo, 3), "BISTRO 21", 70.0 + (m % 4) as f64 * 30.0, "Dining"));
        txs.push(Transaction::new(date(y, mo, 5), "NETFLIX", 15.49, "Subscriptions"));
        txs.push(Transaction::new(date(y, mo, 7), "HULU", 7.99, "Subscriptions"));
        txs.push(Transaction::new(date(y, mo, 9), "GREEN MARKET", 310.0 + (m % 3) as f64 * 20.0, "Groceries"));
        txs.push(Transaction::new(date(y, mo, 13), "CITY POWER", 95.0, "Bills & Utilities"));
        txs.push(Transaction::new(date(y, mo, 16), "GADGET SHOP", 50.0 + (m % 5) as f64 * 25.0, "Shopping"));
        txs.push(Transaction::new(date(y, mo, 22), "TACO TRUCK", 25.0 + (m % 2) as f64 * 10.0, "Dining"));
    }
    Ledger::new(txs)
}

/// Groceries and delivery where delivery = 400 - groceries each month
pub fn inverse_pair_ledger(months: u32) -> Ledger {
    let mut txs = vec![];
    for m in 0..months {
        let (y, mo) = month_start(m);
        let groceries = 120.0 + (m % 6) as f64 * 30.0;
        txs.push(Transaction::new(date(y, mo, 8), "GREEN MARKET", groceries, "Groceries"));
        txs.push(Transaction::new(date(y, mo, 18), "QUICKEATS", 400.0 - groceries, "Delivery"));
        txs.push(Transaction::new(date(y, mo, 12), "GADGET SHOP", 60.0 + (m % 4) as f64 * 15.0, "Shopping"));
    }
    Ledger::new(txs)
}

/// Twelve months where the final month's Travel total is 4x the trailing average
pub fn spike_ledger() -> Ledger {
    let mut txs = vec![];
    for m in 0..12u32 {
        let (y, mo) = month_start(m);
        txs.push(Transaction::new(date(y, mo, 4), "GREEN MARKET", 300.0, "Groceries"));
        let travel = if m == 11 { 800.0 } else { 200.0 };
        txs.push(Transaction::new(date(y, mo, 14), "SKYLINE AIR", travel, "Travel"));
    }
    Ledger::new(txs)
}

/// A monthly subscription charged `prices` in consecutive months
pub fn subscription_ledger(merchant: &str, prices: &[f64]) -> Ledger {
    let txs = prices
        .iter()
        .enumerate()
        .map(|(i, price)| {
            let (y, mo) = month_start(i as u32);
            Transaction::new(date(y, mo, 15), merchant, *price, "Subscriptions")
        })
        .collect();
    Ledger::new(txs)
}

/// Daily purchases over `days` days starting 1 March 2024, no income
pub fn short_ledger(days: i64) -> Ledger {
    let start = date(2024, 3, 1);
    let txs = (0..days)
        .map(|i| {
            let category = if i % 2 == 0 { "Dining" } else { "Shopping" };
            Transaction::new(
                start + chrono::Duration::days(i),
                format!("STORE {}", i % 4),
                15.0 + (i % 7) as f64 * 4.0,
                category,
            )
        })
        .collect();
    Ledger::new(txs)
}

/// Mock Ollama server for narration tests
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start on an available port with a neutral canned reply
    pub async fn start() -> Self {
        Self::start_with_reply("Here is a short summary of the numbers you asked about.").await
    }

    /// Start on an available port; every generate call answers `reply`
    pub async fn start_with_reply(reply: impl Into<String>) -> Self {
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(Arc::new(reply.into()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
        }],
    })
}

async fn handle_generate(
    State(reply): State<Arc<String>>,
    Json(request): Json<GenerateRequest>,
) -> Json<GenerateResponse> {
    Json(GenerateResponse {
        model: request.model,
        response: reply.as_str().to_string(),
        done: true,
    })
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    #[allow(dead_code)]
    prompt: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

//! Progress events and the sink the engine writes them to

use serde::Serialize;
use tokio::sync::mpsc;

use crate::engine::AnalysisRun;
use crate::error::Result;

/// One message on the progress stream
///
/// Serializes as `{"step": ...}`, `{"done": true, "data": ...}` or
/// `{"error": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Step { step: String },
    Done { done: bool, data: Box<AnalysisRun> },
    Error { error: String },
}

impl ProgressEvent {
    pub fn step(step: impl Into<String>) -> Self {
        Self::Step { step: step.into() }
    }

    pub fn done(run: AnalysisRun) -> Self {
        Self::Done {
            done: true,
            data: Box::new(run),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Done and error events end the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Step { .. })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Where progress goes: a bounded channel, or nowhere
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// Drops every event (the blocking path)
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn channel(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub async fn emit(&self, event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() {
            // the computation carries on; the caller can still fetch the run
            tracing::debug!("Progress receiver dropped");
        }
    }

    pub async fn step(&self, step: impl Into<String>) {
        let step = step.into();
        tracing::debug!(%step, "Progress");
        self.emit(ProgressEvent::step(step)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shapes() {
        assert_eq!(
            ProgressEvent::step("Ranking insights").to_json().unwrap(),
            r#"{"step":"Ranking insights"}"#
        );
        assert_eq!(
            ProgressEvent::error("boom").to_json().unwrap(),
            r#"{"error":"boom"}"#
        );
        assert!(!ProgressEvent::step("x").is_terminal());
        assert!(ProgressEvent::error("x").is_terminal());
    }

    #[tokio::test]
    async fn test_sink_forwards_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ProgressSink::channel(tx);
        sink.step("one").await;
        sink.step("two").await;
        drop(sink);

        let mut seen = vec![];
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::Step { step } = event {
                seen.push(step);
            }
        }
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_harmless() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ProgressSink::channel(tx).step("ignored").await;
        ProgressSink::discard().step("ignored").await;
    }
}

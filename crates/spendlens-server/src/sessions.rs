//! In-memory analysis sessions
//!
//! A session holds one uploaded ledger, its profile and the latest analysis
//! run. Sessions expire after a period of inactivity; when the store is full
//! the oldest session is evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sha2::{Digest, Sha256};
use spendlens_core::{AnalysisRun, Ledger, Profile};
use tokio::sync::RwLock;
use tracing::debug;

/// Expired ids remembered so late requests get "expired" rather than "not found"
const EXPIRED_MEMORY: usize = 256;

#[derive(Debug, Clone)]
pub struct Session {
    /// Creation order, used for eviction
    seq: u64,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub ledger: Arc<Ledger>,
    pub profile: Profile,
    pub run: Option<Arc<AnalysisRun>>,
}

impl Session {
    fn new(seq: u64, ledger: Arc<Ledger>, profile: Profile) -> Self {
        Self {
            seq,
            created_at: Instant::now(),
            last_activity: Instant::now(),
            ledger,
            profile,
            run: None,
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() >= timeout
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    NotFound,
    Expired,
}

/// Session info response
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub transaction_count: usize,
    pub months_count: usize,
    pub analyzed: bool,
    pub created_at_secs_ago: u64,
    pub last_activity_secs_ago: u64,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    expired: VecDeque<String>,
}

impl Inner {
    fn forget(&mut self, id: String) {
        if self.expired.len() >= EXPIRED_MEMORY {
            self.expired.pop_front();
        }
        self.expired.push_back(id);
    }

    fn purge_expired(&mut self, timeout: Duration) {
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            self.sessions.remove(&id);
            debug!(session_id = %id, "Session expired");
            self.forget(id);
        }
    }

    /// Live session for `id`, marking it expired if it timed out
    fn live(&mut self, id: &str, timeout: Duration) -> Result<&mut Session, SessionError> {
        let expired = match self.sessions.get(id) {
            Some(session) => session.is_expired(timeout),
            None if self.expired.iter().any(|e| e == id) => return Err(SessionError::Expired),
            None => return Err(SessionError::NotFound),
        };
        if expired {
            self.sessions.remove(id);
            self.forget(id.to_string());
            return Err(SessionError::Expired);
        }
        self.sessions.get_mut(id).ok_or(SessionError::NotFound)
    }
}

/// In-memory session store
#[derive(Debug)]
pub struct SessionStore {
    inner: RwLock<Inner>,
    timeout: Duration,
    max_sessions: usize,
    counter: AtomicU64,
}

impl SessionStore {
    pub fn new(timeout: Duration, max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            timeout,
            max_sessions: max_sessions.max(1),
            counter: AtomicU64::new(0),
        }
    }

    fn session_id(seq: u64, ledger: &Ledger) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_le_bytes());
        hasher.update(seq.to_le_bytes());
        hasher.update(ledger.fingerprint().as_bytes());
        let hash = hex::encode(hasher.finalize());
        format!("sl_{}", &hash[..24])
    }

    /// Create a session and return its id
    pub async fn create(&self, ledger: Arc<Ledger>, profile: Profile) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let session_id = Self::session_id(seq, &ledger);
        let mut inner = self.inner.write().await;

        // Clean up expired sessions while we're here
        inner.purge_expired(self.timeout);

        while inner.sessions.len() >= self.max_sessions {
            let oldest = inner
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.seq)
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else {
                break;
            };
            inner.sessions.remove(&oldest);
            debug!(session_id = %oldest, "Evicted oldest session");
        }

        inner
            .sessions
            .insert(session_id.clone(), Session::new(seq, ledger, profile));
        session_id
    }

    /// Fetch a session, refreshing its activity time
    pub async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        let mut inner = self.inner.write().await;
        let session = inner.live(session_id, self.timeout)?;
        session.touch();
        Ok(session.clone())
    }

    /// Attach the latest analysis run to a session
    pub async fn store_run(&self, session_id: &str, run: Arc<AnalysisRun>) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        let session = inner.live(session_id, self.timeout)?;
        session.run = Some(run);
        session.touch();
        Ok(())
    }

    pub async fn info(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        let session = self.get(session_id).await?;
        Ok(SessionInfo {
            session_id: session_id.to_string(),
            transaction_count: session.ledger.len(),
            months_count: session.profile.months_count,
            analyzed: session.run.is_some(),
            created_at_secs_ago: session.created_at.elapsed().as_secs(),
            last_activity_secs_ago: 0,
        })
    }

    /// Delete a session
    pub async fn remove(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendlens_core::test_utils::household_ledger;
    use spendlens_core::Profiler;

    fn ledger_and_profile() -> (Arc<Ledger>, Profile) {
        let ledger = household_ledger(4);
        let profile = Profiler::new().profile(&ledger).unwrap();
        (Arc::new(ledger), profile)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::new(Duration::from_secs(60), 5);
        let (ledger, profile) = ledger_and_profile();
        let id = store.create(ledger, profile).await;

        assert!(id.starts_with("sl_"));
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.ledger.len(), 36);
        assert!(session.run.is_none());
        assert_eq!(store.get("sl_missing").await.unwrap_err(), SessionError::NotFound);
    }

    #[tokio::test]
    async fn test_expired_session_reports_expired() {
        let store = SessionStore::new(Duration::ZERO, 5);
        let (ledger, profile) = ledger_and_profile();
        let id = store.create(ledger, profile).await;

        assert_eq!(store.get(&id).await.unwrap_err(), SessionError::Expired);
        // still expired on a second look, after removal
        assert_eq!(store.get(&id).await.unwrap_err(), SessionError::Expired);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_oldest_session_evicted_at_capacity() {
        let store = SessionStore::new(Duration::from_secs(60), 2);
        let mut ids = vec![];
        for _ in 0..3 {
            let (ledger, profile) = ledger_and_profile();
            ids.push(store.create(ledger, profile).await);
        }

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&ids[0]).await.unwrap_err(), SessionError::NotFound);
        assert!(store.get(&ids[2]).await.is_ok());
    }
}

use std::time::Duration;

use breachx_model::{ScanId, ScanSession, ScanSessionStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

/// In-memory table of launched scans.
///
/// Constructed once at startup and shared by handle. Entries expire a
/// fixed time after their `start_time`; [`Self::evict_expired`] is driven
/// by a background sweeper.
#[derive(Debug)]
pub struct ScanSessionRegistry {
    sessions: DashMap<ScanId, ScanSession>,
    ttl: Duration,
}

impl ScanSessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn create(&self, session: ScanSession) -> ScanId {
        let scan_id = session.scan_id;
        self.sessions.insert(scan_id, session);
        scan_id
    }

    pub fn get(&self, scan_id: &ScanId) -> Option<ScanSession> {
        self.sessions.get(scan_id).map(|entry| entry.value().clone())
    }

    /// Record that a poll observed the task winding down. Returns `false`
    /// for unknown ids.
    pub fn mark_stopped(&self, scan_id: &ScanId) -> bool {
        match self.sessions.get_mut(scan_id) {
            Some(mut entry) => {
                entry.status = ScanSessionStatus::Stopped;
                true
            }
            None => false,
        }
    }

    /// Drop sessions whose age at `now` exceeds the TTL.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or(chrono::Duration::MAX);
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.signed_duration_since(session.start_time) < ttl);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "evicted scan sessions");
        }
        evicted
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

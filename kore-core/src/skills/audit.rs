//! Bounded ring-buffer audit log for permission evaluations and tool
//! executions. Generalized from the teacher's append-only log-file audit
//! trail (`audit::permission_log`) into an in-memory ring buffer.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use super::types::AuditEvent;

const DEFAULT_CAPACITY: usize = 2_048;

pub struct AuditLogger {
    capacity: usize,
    events: RwLock<VecDeque<AuditEvent>>,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AuditLogger {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, events: RwLock::new(VecDeque::with_capacity(capacity.min(256))) }
    }

    pub async fn record(&self, event: AuditEvent) {
        let mut guard = self.events.write().await;
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
    }

    pub async fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let guard = self.events.read().await;
        guard.iter().rev().take(limit).cloned().collect()
    }

    pub async fn for_skill(&self, skill_id: &str) -> Vec<AuditEvent> {
        self.events.read().await.iter().filter(|e| e.skill_id == skill_id).cloned().collect()
    }
}

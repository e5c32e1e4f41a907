// libs/conversation-cell/src/services/store.rs
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_models::CallerRole;

use crate::models::ConversationFlow;

/// In-memory registry of live conversations, keyed by contact identifier.
/// Each flow sits behind its own lock: turns from the same contact are
/// serialized, turns from different contacts only contend on the map.
pub struct FlowStore {
    flows: Mutex<HashMap<String, Arc<Mutex<ConversationFlow>>>>,
    ttl_minutes: i64,
}

impl FlowStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            flows: Mutex::new(HashMap::new()),
            ttl_minutes,
        }
    }

    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Returns the live flow for a contact, replacing it with a fresh one if
    /// it expired. Expired flows of other contacts are swept opportunistically.
    pub async fn acquire(
        &self,
        contact: &str,
        organization_id: Uuid,
        caller_role: CallerRole,
        now: DateTime<Utc>,
    ) -> Arc<Mutex<ConversationFlow>> {
        let mut flows = self.flows.lock().await;

        flows.retain(|key, slot| match slot.try_lock() {
            Ok(flow) => {
                let keep = !flow.is_expired(now);
                if !keep {
                    debug!("Evicting expired conversation with {}", key);
                }
                keep
            }
            // Locked means a turn is in flight; never evict under it.
            Err(_) => true,
        });

        flows
            .entry(contact.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationFlow::new(
                    contact,
                    organization_id,
                    caller_role,
                    now,
                    self.ttl_minutes,
                )))
            })
            .clone()
    }

    pub async fn remove(&self, contact: &str) {
        self.flows.lock().await.remove(contact);
    }

    pub async fn active_count(&self) -> usize {
        self.flows.lock().await.len()
    }
}

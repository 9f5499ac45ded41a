//! Registry of tab sessions, keyed by the opaque id carried in the session cookie.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{InMemorySessionStore, SessionStore};

/// Generates a new tab session id.
///
/// 32 random bytes encoded as base64url (43 characters).
#[must_use]
pub fn generate_session_id() -> String {
    crate::random_token()
}

struct TabEntry {
    store: Arc<dyn SessionStore>,
    last_seen: Instant,
}

impl TabEntry {
    fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            last_seen: Instant::now(),
        }
    }
}

/// Maps tab session ids to their stores.
///
/// Every lookup refreshes the tab's idle clock; [`SessionRegistry::sweep_idle`]
/// drops tabs that have not been seen for a given duration.
#[derive(Default)]
pub struct SessionRegistry {
    stores: DashMap<String, TabEntry>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an existing tab session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<dyn SessionStore>> {
        self.stores.get_mut(session_id).map(|mut entry| {
            entry.last_seen = Instant::now();
            Arc::clone(&entry.store)
        })
    }

    /// Returns the store for `session_id`, or a freshly created one.
    ///
    /// Unknown or absent ids get a new id, so a client can never choose its
    /// own session id. The returned flag is `true` when a new session was
    /// created.
    pub fn get_or_create(&self, session_id: Option<&str>) -> (String, Arc<dyn SessionStore>, bool) {
        if let Some(id) = session_id
            && let Some(store) = self.get(id)
        {
            return (id.to_string(), store, false);
        }

        let id = generate_session_id();
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        self.stores.insert(id.clone(), TabEntry::new(Arc::clone(&store)));
        tracing::debug!(sessions = self.stores.len(), "created tab session");
        (id, store, true)
    }

    /// Drops a tab session.
    pub fn remove(&self, session_id: &str) -> bool {
        self.stores.remove(session_id).is_some()
    }

    /// Drops every tab idle for at least `max_idle` and returns their ids.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        self.stores.retain(|id, entry| {
            let keep = entry.last_seen.elapsed() < max_idle;
            if !keep {
                expired.push(id.clone());
            }
            keep
        });
        if !expired.is_empty() {
            tracing::debug!(
                removed = expired.len(),
                remaining = self.stores.len(),
                "swept idle tab sessions"
            );
        }
        expired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;

    #[test]
    fn test_generate_session_id() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_get_or_create() {
        let registry = SessionRegistry::new();

        let (id, store, created) = registry.get_or_create(None);
        assert!(created);
        store.put(SessionKey::PatientId, "pt-1".into()).await.unwrap();

        let (same_id, same_store, created) = registry.get_or_create(Some(&id));
        assert!(!created);
        assert_eq!(same_id, id);
        assert_eq!(
            same_store.get(SessionKey::PatientId).await.unwrap().as_deref(),
            Some("pt-1")
        );

        let (other_id, _, created) = registry.get_or_create(Some("forged-id"));
        assert!(created);
        assert_ne!(other_id, "forged-id");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sweep_idle() {
        let registry = SessionRegistry::new();
        let (id, _, _) = registry.get_or_create(None);

        assert!(registry.sweep_idle(Duration::from_secs(3600)).is_empty());
        assert_eq!(registry.len(), 1);

        let swept = registry.sweep_idle(Duration::ZERO);
        assert_eq!(swept, vec![id.clone()]);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_refreshes_idle_clock() {
        let registry = SessionRegistry::new();
        let (stale, _, _) = registry.get_or_create(None);
        let (fresh, _, _) = registry.get_or_create(None);

        std::thread::sleep(Duration::from_millis(50));
        assert!(registry.get(&fresh).is_some());

        let swept = registry.sweep_idle(Duration::from_millis(40));
        assert_eq!(swept, vec![stale]);
        assert!(registry.get(&fresh).is_some());
    }

    #[test]
    fn test_remove() {
        let registry = SessionRegistry::new();
        let (id, _, _) = registry.get_or_create(None);
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.is_empty());
    }
}

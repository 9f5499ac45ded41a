//! In-memory [`SessionStore`] backed by a `tokio` read/write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionError, SessionKey, SessionStore};

/// Process-local session store for a single tab.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<SessionKey, String>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: SessionKey) -> Result<Option<String>, SessionError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn put(&self, key: SessionKey, value: String) -> Result<(), SessionError> {
        self.entries.write().await.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: SessionKey) -> Result<Option<String>, SessionError> {
        Ok(self.entries.write().await.remove(&key))
    }

    async fn replace(
        &self,
        remove: &[SessionKey],
        entries: Vec<(SessionKey, String)>,
    ) -> Result<(), SessionError> {
        let mut guard = self.entries.write().await;
        for key in remove {
            guard.remove(key);
        }
        guard.extend(entries);
        tracing::trace!(removed = remove.len(), stored = guard.len(), "session store updated");
        Ok(())
    }

    async fn snapshot(&self) -> Result<HashMap<SessionKey, String>, SessionError> {
        Ok(self.entries.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = InMemorySessionStore::new();
        assert!(store.get(SessionKey::AccessToken).await.unwrap().is_none());

        store
            .put(SessionKey::AccessToken, "tok1".into())
            .await
            .unwrap();
        assert_eq!(
            store.get(SessionKey::AccessToken).await.unwrap().as_deref(),
            Some("tok1")
        );

        let removed = store.remove(SessionKey::AccessToken).await.unwrap();
        assert_eq!(removed.as_deref(), Some("tok1"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_auth_removes_both_groups() {
        let store = InMemorySessionStore::new();
        store
            .put_all(vec![
                (SessionKey::AccessToken, "tok1".into()),
                (SessionKey::PatientId, "pt-42".into()),
                (SessionKey::LaunchIssuer, "https://ehr.example.org".into()),
                (SessionKey::LaunchToken, "abc123".into()),
            ])
            .await
            .unwrap();

        store.clear_auth().await.unwrap();

        assert!(store.get(SessionKey::AccessToken).await.unwrap().is_none());
        assert!(store.get(SessionKey::PatientId).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_replace_is_atomic_for_readers() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .put_all(vec![
                (SessionKey::AccessToken, "old".into()),
                (SessionKey::PatientId, "old".into()),
            ])
            .await
            .unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    let value = format!("v{i}");
                    store
                        .replace(
                            &SessionKey::AUTH_KEYS,
                            vec![
                                (SessionKey::AccessToken, value.clone()),
                                (SessionKey::PatientId, value),
                            ],
                        )
                        .await
                        .unwrap();
                }
            })
        };

        for _ in 0..200 {
            let snapshot = store.snapshot().await.unwrap();
            assert_eq!(
                snapshot.get(&SessionKey::AccessToken),
                snapshot.get(&SessionKey::PatientId)
            );
        }

        writer.await.unwrap();
    }
}

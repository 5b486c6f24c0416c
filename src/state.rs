use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::db::DbPool;
use crate::services::alerts::AlertDispatcher;
use crate::services::receipt::ReceiptImporter;
use crate::xsrf::XsrfToken;

/// A logged-in browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub xsrf_token: String,
}

/// Server-side session store keyed by the session cookie value.
#[derive(Clone, Default)]
pub struct SessionStore(Arc<Mutex<HashMap<String, Session>>>);

impl SessionStore {
    /// Open a session for `user_id` and return its cookie value.
    pub fn create(&self, user_id: i64) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let session = Session {
            user_id,
            xsrf_token: XsrfToken::generate().value().to_string(),
        };
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.clone(), session);
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .cloned()
    }

    pub fn remove(&self, token: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    /// Token for forms rendered without a session (login, signup).
    pub anon_xsrf: XsrfToken,
    pub alerts: AlertDispatcher,
    pub importer: Arc<ReceiptImporter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_have_distinct_tokens() {
        let store = SessionStore::default();
        let a = store.create(1);
        let b = store.create(1);
        assert_ne!(a, b);

        let sa = store.get(&a).unwrap();
        let sb = store.get(&b).unwrap();
        assert_eq!(sa.user_id, 1);
        assert_ne!(sa.xsrf_token, sb.xsrf_token);

        store.remove(&a);
        assert!(store.get(&a).is_none());
        assert!(store.get(&b).is_some());
    }
}

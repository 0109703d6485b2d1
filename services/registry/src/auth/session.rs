//! Server-side sessions.
//!
//! # Purpose
//! A browser login stores the caller's [`Subject`] in a session keyed by a
//! cookie. Values are written with a tagged, versioned envelope so a future
//! shape change can be detected instead of silently misread.
//!
//! # Key invariants
//! - The subject lives under the `"user"` key.
//! - A value that does not decode is cleared in place and reported as
//!   `InvalidValue`.
use crate::auth::authenticate::{AuthError, SESSION_SOURCE};
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use dashmap::DashMap;
use registry_authz::Subject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_USER_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SessionValue {
    #[serde(rename = "subject.v1")]
    SubjectV1 { subject: Subject },
}

pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str, key: &str) -> Option<Value>;
    fn set(&self, session_id: &str, key: &str, value: Value);
    fn remove(&self, session_id: &str, key: &str);
    fn destroy(&self, session_id: &str);
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, HashMap<String, Value>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        self.sessions
            .get(session_id)
            .and_then(|values| values.get(key).cloned())
    }

    fn set(&self, session_id: &str, key: &str, value: Value) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn remove(&self, session_id: &str, key: &str) {
        if let Some(mut values) = self.sessions.get_mut(session_id) {
            values.remove(key);
        }
    }

    fn destroy(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
}

impl Sessions {
    pub fn new(store: Arc<dyn SessionStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            store,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Session id from the `Cookie` header, if the session cookie is present.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Open a new session for `subject` and return its id.
    pub fn start(&self, subject: &Subject) -> Result<String, serde_json::Error> {
        let session_id = Uuid::new_v4().to_string();
        let value = serde_json::to_value(SessionValue::SubjectV1 {
            subject: subject.clone(),
        })?;
        self.store.set(&session_id, SESSION_USER_KEY, value);
        Ok(session_id)
    }

    pub fn end(&self, session_id: &str) {
        self.store.destroy(session_id);
    }

    /// `Set-Cookie` value binding the client to `session_id`.
    pub fn cookie(&self, session_id: &str) -> String {
        format!(
            "{}={session_id}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name
        )
    }

    /// Resolve the session subject.
    ///
    /// # Errors
    /// - `Missing` when no session cookie or no stored subject exists.
    /// - `InvalidValue` when the stored value does not decode; the value is cleared.
    pub fn subject(&self, headers: &HeaderMap) -> Result<Subject, AuthError> {
        let session_id = self
            .session_id(headers)
            .ok_or(AuthError::Missing(SESSION_SOURCE))?;
        let raw = self
            .store
            .get(&session_id, SESSION_USER_KEY)
            .ok_or(AuthError::Missing(SESSION_SOURCE))?;
        match serde_json::from_value::<SessionValue>(raw) {
            Ok(SessionValue::SubjectV1 { subject }) => Ok(subject),
            Err(err) => {
                tracing::warn!(error = %err, "clearing undecodable session value");
                self.store.remove(&session_id, SESSION_USER_KEY);
                Err(AuthError::InvalidValue(
                    SESSION_SOURCE,
                    "corrupt session value".to_string(),
                ))
            }
        }
    }
}

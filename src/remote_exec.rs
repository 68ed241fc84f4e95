//! Jaskier Shared Pattern — remote_exec
//! Remote execution sessions (spec.md §3 "Session (remote-exec)", §6
//! `/opsx/*`). A `Session` tracks a single handshake → execute → close
//! lifecycle; `SessionStore` mirrors `client_pool.rs`'s DashMap + TTL +
//! janitor shape, generalized from an idle-eviction cache to an
//! expiry-sweep store.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Closed,
    Expired,
}

impl SessionStatus {
    fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Closed | SessionStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<Value>,
}

pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self { sessions: DashMap::new(), ttl })
    }

    pub fn handshake(&self, request: Value) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            status: SessionStatus::Pending,
            request: Some(request),
            response: None,
            error: None,
            created_at: now,
            last_activity: now,
            expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or_default(),
            messages: Vec::new(),
        };
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Appends a turn and, unless the session is already terminal, marks it
    /// `running` with the new response attached.
    pub fn execute(&self, id: Uuid, request: Value, response: Value) -> GatewayResult<Session> {
        let mut entry = self.sessions.get_mut(&id).ok_or_else(|| GatewayError::NotFound(format!("no session {id}")))?;
        if entry.status.is_terminal() {
            return Err(GatewayError::InvalidRequest(format!("session {id} is already {:?}", entry.status)));
        }
        entry.status = SessionStatus::Running;
        entry.messages.push(request.clone());
        entry.messages.push(response.clone());
        entry.request = Some(request);
        entry.response = Some(response);
        entry.last_activity = Utc::now();
        Ok(entry.clone())
    }

    pub fn status(&self, id: Uuid) -> GatewayResult<Session> {
        self.sessions.get(&id).map(|e| e.clone()).ok_or_else(|| GatewayError::NotFound(format!("no session {id}")))
    }

    pub fn close(&self, id: Uuid) -> GatewayResult<Session> {
        let mut entry = self.sessions.get_mut(&id).ok_or_else(|| GatewayError::NotFound(format!("no session {id}")))?;
        if !entry.status.is_terminal() {
            entry.status = SessionStatus::Closed;
        }
        entry.last_activity = Utc::now();
        Ok(entry.clone())
    }

    /// Marks sessions past `expires_at` as `expired` and drops ones already
    /// terminal for a full `ttl` past their last activity.
    pub fn sweep(&self) {
        let now = Utc::now();
        for mut entry in self.sessions.iter_mut() {
            if !entry.status.is_terminal() && entry.expires_at <= now {
                entry.status = SessionStatus::Expired;
            }
        }
        let idle_cutoff = now - chrono::Duration::from_std(self.ttl).unwrap_or_default();
        self.sessions.retain(|_, s| !(s.status.is_terminal() && s.last_activity < idle_cutoff));
    }

    /// Sweeper cadence is `ttl/10`, minimum 1s (spec.md §5).
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let period = (store.ttl / 10).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }
}

#[utoipa::path(post, path = "/opsx/handshake", tag = "opsx", request_body = serde_json::Value,
    responses((status = 200, description = "A new remote-exec session", body = Session)))]
pub async fn handshake(State(state): State<AppState>, Json(request): Json<Value>) -> Json<Session> {
    Json(state.sessions.handshake(request))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteRequest {
    pub session_id: Uuid,
    pub request: Value,
}

#[utoipa::path(post, path = "/opsx/execute", tag = "opsx", request_body = ExecuteRequest,
    responses((status = 200, description = "Session advanced with a new turn", body = Session)))]
pub async fn execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> GatewayResult<Json<Session>> {
    // This core has no model-inference backend of its own (spec.md §1
    // Non-goals: "providing offline model inference") — the response here
    // is whatever the caller supplied to record, not a generated reply.
    let response = req.request.clone();
    let session = state.sessions.execute(req.session_id, req.request, response)?;
    Ok(Json(session))
}

#[utoipa::path(get, path = "/opsx/status/{id}", tag = "opsx",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Current session state", body = Session)))]
pub async fn status(State(state): State<AppState>, Path(id): Path<Uuid>) -> GatewayResult<Json<Session>> {
    Ok(Json(state.sessions.status(id)?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseRequest {
    pub session_id: Uuid,
}

#[utoipa::path(post, path = "/opsx/close", tag = "opsx", request_body = CloseRequest,
    responses((status = 200, description = "Session closed", body = Session)))]
pub async fn close(State(state): State<AppState>, Json(req): Json<CloseRequest>) -> GatewayResult<Json<Session>> {
    Ok(Json(state.sessions.close(req.session_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handshake_then_execute_then_close() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.handshake(json!({"hello": true}));
        assert_eq!(session.status, SessionStatus::Pending);

        let advanced = store.execute(session.id, json!({"q": 1}), json!({"a": 1})).unwrap();
        assert_eq!(advanced.status, SessionStatus::Running);
        assert_eq!(advanced.messages.len(), 2);

        let closed = store.close(session.id).unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
    }

    #[test]
    fn execute_on_closed_session_is_rejected() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.handshake(json!({}));
        store.close(session.id).unwrap();
        let result = store.execute(session.id, json!({}), json!({}));
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn status_on_unknown_session_is_not_found() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(matches!(store.status(Uuid::new_v4()), Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn sweep_expires_past_deadline_sessions() {
        let store = SessionStore::new(Duration::from_millis(1));
        let session = store.handshake(json!({}));
        std::thread::sleep(Duration::from_millis(5));
        store.sweep();
        assert_eq!(store.status(session.id).unwrap().status, SessionStatus::Expired);
    }

    #[test]
    fn sweep_drops_terminal_sessions_past_ttl() {
        let store = SessionStore::new(Duration::from_millis(1));
        let session = store.handshake(json!({}));
        store.close(session.id).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        store.sweep();
        assert!(matches!(store.status(session.id), Err(GatewayError::NotFound(_))));
    }
}

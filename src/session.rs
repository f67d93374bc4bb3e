//! Single-session coordinator.
//!
//! At most one analysis may consume the detector/OCR resource. Starting a
//! session stops and deregisters every other one under a single lock; the
//! stopped workers notice through their [`SessionHandle`] on their next
//! frame and unwind as [`SessionOutcome::Aborted`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

pub type SessionId = String;

/// Externally visible session lifecycle. A stop request is a flag on the
/// handle, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Registered,
    Running,
    Completed,
    Aborted,
    Failed,
}

/// How a session's frame loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    /// Stop flag observed
    Aborted,
    Failed(String),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed => SessionState::Completed,
            Self::Aborted => SessionState::Aborted,
            Self::Failed(_) => SessionState::Failed,
        }
    }
}

#[derive(Debug)]
struct SessionControl {
    session_id: SessionId,
    started_at: DateTime<Utc>,
    stop: AtomicBool,
    paused: AtomicBool,
    state: Mutex<SessionState>,
}

impl SessionControl {
    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancellation handle owned by the worker running one session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: Arc<SessionControl>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.control.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.control.started_at
    }

    /// Checked once per frame by the worker.
    pub fn should_stop(&self) -> bool {
        self.control.stop.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.control.paused.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    /// Called by the worker once its frame loop begins.
    pub fn mark_running(&self) {
        self.control.set_state(SessionState::Running);
    }
}

/// Registry of active sessions, shared by `Arc` between the launcher and
/// the workers.
#[derive(Debug, Default)]
pub struct SessionCoordinator {
    sessions: Mutex<HashMap<SessionId, Arc<SessionControl>>>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<SessionControl>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop and deregister every registered session, then register
    /// `session_id` as the only active one.
    pub fn start(&self, session_id: impl Into<SessionId>) -> SessionHandle {
        let session_id = session_id.into();
        let control = Arc::new(SessionControl {
            session_id: session_id.clone(),
            started_at: Utc::now(),
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            state: Mutex::new(SessionState::Registered),
        });

        let mut sessions = self.registry();
        for (id, previous) in sessions.drain() {
            previous.stop.store(true, Ordering::Release);
            tracing::info!(session_id = %id, superseded_by = %session_id, "stopping previous session");
        }
        sessions.insert(session_id.clone(), Arc::clone(&control));
        drop(sessions);

        tracing::info!(%session_id, "session registered");
        SessionHandle { control }
    }

    /// Set the stop flag of `session_id` without waiting for the worker.
    pub fn request_stop(&self, session_id: &str) -> bool {
        match self.registry().get(session_id) {
            Some(control) => {
                control.stop.store(true, Ordering::Release);
                tracing::info!(%session_id, "stop requested");
                true
            }
            None => false,
        }
    }

    pub fn pause(&self, session_id: &str) -> bool {
        self.set_paused(session_id, true)
    }

    pub fn resume(&self, session_id: &str) -> bool {
        self.set_paused(session_id, false)
    }

    fn set_paused(&self, session_id: &str, paused: bool) -> bool {
        match self.registry().get(session_id) {
            Some(control) => {
                control.paused.store(paused, Ordering::Release);
                tracing::info!(%session_id, paused, "pause flag changed");
                true
            }
            None => false,
        }
    }

    /// Record the final state and deregister the session, unless the id has
    /// since been taken over by a newer registration.
    pub fn complete(&self, handle: &SessionHandle, outcome: &SessionOutcome) -> bool {
        handle.control.set_state(outcome.state());

        let mut sessions = self.registry();
        let owned = sessions
            .get(handle.session_id())
            .is_some_and(|current| Arc::ptr_eq(current, &handle.control));
        if owned {
            sessions.remove(handle.session_id());
        }
        drop(sessions);

        tracing::info!(session_id = %handle.session_id(), ?outcome, "session finished");
        owned
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.registry().contains_key(session_id)
    }

    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.registry().keys().cloned().collect()
    }
}

//! Session lifecycle registry.
//!
//! A session spans one pairing through final disconnect, possibly with
//! several connect/disconnect cycles in between. Records are append-only:
//! they are never removed, only marked `Ended`.
//!
//! ```text
//!  create ──► Pending ──connect──► Connected ──disconnect──► Disconnected
//!                ▲                     ▲                          │
//!                │                     └──────connect─────────────┤
//!                └──────────────reconnect (budget left)───────────┤
//!                                                                  ▼
//!                                 reconnect (budget exhausted) ──► Error
//!
//!  any ──end──► Ended
//! ```

use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DeskbeamError;

/// Default reconnect budget per session.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

const EVENT_CAPACITY: usize = 64;

// ── SessionStatus ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Pending,
    Connected,
    Disconnected,
    /// Reconnect budget exhausted. Terminal except for `end`.
    Error,
    /// Terminal.
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Error => write!(f, "Error"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

// ── SessionRecord ────────────────────────────────────────────────

/// Who a session is between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParticipants {
    pub host_id: String,
    pub host_name: String,
    pub client_id: String,
    pub client_name: String,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub participants: SessionParticipants,
    pub created_at: Instant,
    pub status: SessionStatus,
    pub last_connected_at: Option<Instant>,
    pub disconnected_at: Option<Instant>,
    pub disconnect_reason: Option<String>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    /// Sum of closed Connected intervals.
    accumulated: Duration,
}

impl SessionRecord {
    /// Total connected time, including the open interval when Connected.
    pub fn duration_at(&self, now: Instant) -> Duration {
        match (self.status, self.last_connected_at) {
            (SessionStatus::Connected, Some(since)) => {
                self.accumulated + now.saturating_duration_since(since)
            }
            _ => self.accumulated,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration_at(Instant::now())
    }

    fn close_interval(&mut self, now: Instant) {
        if let (SessionStatus::Connected, Some(since)) = (self.status, self.last_connected_at) {
            self.accumulated += now.saturating_duration_since(since);
        }
    }
}

// ── SessionEvent ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created(Uuid),
    StatusChanged {
        session: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    },
    /// A reconnect was refused because the budget ran out.
    ReconnectFailed(Uuid),
}

// ── SessionRegistry ──────────────────────────────────────────────

/// Owns every session record created by this process.
pub struct SessionRegistry {
    records: RwLock<Vec<SessionRecord>>,
    max_reconnect_attempts: u32,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_max_reconnect_attempts(DEFAULT_MAX_RECONNECT_ATTEMPTS)
    }

    pub fn with_max_reconnect_attempts(max_reconnect_attempts: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: RwLock::new(Vec::new()),
            max_reconnect_attempts,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Create a new `Pending` record.
    pub fn create(&self, participants: SessionParticipants) -> SessionRecord {
        self.create_at(participants, Instant::now())
    }

    pub fn create_at(&self, participants: SessionParticipants, now: Instant) -> SessionRecord {
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            participants,
            created_at: now,
            status: SessionStatus::Pending,
            last_connected_at: None,
            disconnected_at: None,
            disconnect_reason: None,
            reconnect_attempts: 0,
            max_reconnect_attempts: self.max_reconnect_attempts,
            accumulated: Duration::ZERO,
        };
        self.write().push(record.clone());
        info!(session = %record.session_id, client = %record.participants.client_name, "session created");
        let _ = self.events.send(SessionEvent::Created(record.session_id));
        record
    }

    /// Snapshot of one record.
    pub fn get(&self, id: Uuid) -> Result<SessionRecord, DeskbeamError> {
        self.read()
            .iter()
            .find(|r| r.session_id == id)
            .cloned()
            .ok_or(DeskbeamError::SessionNotFound(id))
    }

    /// `Pending | Disconnected → Connected`.
    pub fn connect(&self, id: Uuid) -> Result<(), DeskbeamError> {
        self.connect_at(id, Instant::now())
    }

    pub fn connect_at(&self, id: Uuid, now: Instant) -> Result<(), DeskbeamError> {
        self.transition(id, "connect", |record| match record.status {
            SessionStatus::Pending | SessionStatus::Disconnected => {
                record.status = SessionStatus::Connected;
                record.last_connected_at = Some(now);
                record.reconnect_attempts = 0;
                record.disconnect_reason = None;
                Ok(())
            }
            _ => Err(()),
        })
        .map(|_| ())
    }

    /// `Connected → Disconnected`, closing out the connected interval.
    pub fn disconnect(&self, id: Uuid, reason: Option<String>) -> Result<(), DeskbeamError> {
        self.disconnect_at(id, reason, Instant::now())
    }

    pub fn disconnect_at(
        &self,
        id: Uuid,
        reason: Option<String>,
        now: Instant,
    ) -> Result<(), DeskbeamError> {
        self.transition(id, "disconnect", |record| match record.status {
            SessionStatus::Connected => {
                record.close_interval(now);
                record.status = SessionStatus::Disconnected;
                record.disconnected_at = Some(now);
                record.disconnect_reason = reason;
                Ok(())
            }
            _ => Err(()),
        })
        .map(|_| ())
    }

    /// `Disconnected → Pending` while the reconnect budget lasts, else `Error`.
    ///
    /// Returns the resulting status.
    pub fn reconnect(&self, id: Uuid) -> Result<SessionStatus, DeskbeamError> {
        let status = self.transition(id, "reconnect", |record| match record.status {
            SessionStatus::Disconnected => {
                if record.reconnect_attempts < record.max_reconnect_attempts {
                    record.reconnect_attempts += 1;
                    record.status = SessionStatus::Pending;
                } else {
                    record.status = SessionStatus::Error;
                }
                Ok(())
            }
            _ => Err(()),
        })?;

        if status == SessionStatus::Error {
            warn!(session = %id, "reconnect budget exhausted");
            let _ = self.events.send(SessionEvent::ReconnectFailed(id));
        }
        Ok(status)
    }

    /// Any status `→ Ended`.
    pub fn end(&self, id: Uuid) -> Result<(), DeskbeamError> {
        self.end_at(id, Instant::now())
    }

    pub fn end_at(&self, id: Uuid, now: Instant) -> Result<(), DeskbeamError> {
        self.transition(id, "end", |record| {
            record.close_interval(now);
            record.status = SessionStatus::Ended;
            Ok(())
        })
        .map(|_| ())
    }

    pub fn duration(&self, id: Uuid) -> Result<Duration, DeskbeamError> {
        self.duration_at(id, Instant::now())
    }

    pub fn duration_at(&self, id: Uuid, now: Instant) -> Result<Duration, DeskbeamError> {
        self.get(id).map(|r| r.duration_at(now))
    }

    /// The single Connected record, if any.
    pub fn active_session(&self) -> Option<SessionRecord> {
        self.read()
            .iter()
            .find(|r| r.status == SessionStatus::Connected)
            .cloned()
    }

    /// Full history in creation order.
    pub fn all_sessions(&self) -> Vec<SessionRecord> {
        self.read().clone()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Apply `apply` under the write lock; `Err(())` means the operation
    /// is not valid from the record's current status.
    fn transition<F>(
        &self,
        id: Uuid,
        operation: &'static str,
        apply: F,
    ) -> Result<SessionStatus, DeskbeamError>
    where
        F: FnOnce(&mut SessionRecord) -> Result<(), ()>,
    {
        let (from, to) = {
            let mut records = self.write();
            let record = records
                .iter_mut()
                .find(|r| r.session_id == id)
                .ok_or(DeskbeamError::SessionNotFound(id))?;
            let from = record.status;
            apply(record).map_err(|()| DeskbeamError::InvalidTransition {
                session: id,
                from,
                operation,
            })?;
            (from, record.status)
        };

        debug!(session = %id, %from, %to, operation, "session transition");
        let _ = self.events.send(SessionEvent::StatusChanged {
            session: id,
            from,
            to,
        });
        Ok(to)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<SessionRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<SessionRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

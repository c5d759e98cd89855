//! Core data model.
//!
//! A batch request is a unit of asynchronous work identified by a key
//! derived from its target URI and canonicalized parameters. Queue entries
//! are its persisted generations; a batch status is the projection handed
//! back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::codec::{self, MAX_KEY_LENGTH, Params};
use crate::error::{Error, Result};

/// Default processing-time hint for a request (matches the queue's
/// historical 60s default).
pub const DEFAULT_ESTIMATED_TIME: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// No entry exists for the key. Virtual: never persisted.
    Unknown,
    /// Queued, waiting for a worker.
    Pending,
    /// Claimed by a worker, processing started.
    InProgress,
    /// Processing finished successfully.
    Completed,
    /// Processing could not be completed.
    Failed,
}

impl Status {
    /// The persisted string form (also the SQL bind value).
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unknown => "Unknown",
            Status::Pending => "Pending",
            Status::InProgress => "InProgress",
            Status::Completed => "Completed",
            Status::Failed => "Failed",
        }
    }

    /// Still outstanding work: Pending or InProgress.
    pub fn is_incomplete(self) -> bool {
        matches!(self, Status::Pending | Status::InProgress)
    }

    /// Terminal for this generation (until superseded by a new one).
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Unknown" => Ok(Status::Unknown),
            "Pending" => Ok(Status::Pending),
            "InProgress" => Ok(Status::InProgress),
            "Completed" => Ok(Status::Completed),
            "Failed" => Ok(Status::Failed),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRequest
// ---------------------------------------------------------------------------

/// A unit of work to be queued: target URI plus parameter multimap.
///
/// Immutable once constructed; builder-style setters consume self. The key
/// is derived lazily from the URI and canonical parameters unless assigned
/// explicitly.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    request_uri: String,
    parameters: Params,
    key: OnceLock<String>,
    estimated_time: Duration,
    sticky: bool,
}

impl BatchRequest {
    pub fn new(request_uri: impl Into<String>, parameters: Params) -> Self {
        Self {
            request_uri: request_uri.into(),
            parameters,
            key: OnceLock::new(),
            estimated_time: DEFAULT_ESTIMATED_TIME,
            sticky: false,
        }
    }

    /// Construct from an encoded parameter string (need not be canonical).
    pub fn from_encoded(request_uri: impl Into<String>, parameter_string: &str) -> Self {
        Self::new(request_uri, Params::decode(parameter_string))
    }

    pub fn with_estimated_time(mut self, estimated_time: Duration) -> Self {
        self.estimated_time = estimated_time;
        self
    }

    /// Mark the result for persistent caching downstream. Not persisted by
    /// the queue itself.
    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    /// Assign an explicit key, useful when the key should be readable.
    ///
    /// Must fit in [`MAX_KEY_LENGTH`] and contain no `/` path separators.
    pub fn with_key(self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.len() > MAX_KEY_LENGTH || key.contains('/') {
            return Err(Error::InvalidKey(key));
        }
        let cell = OnceLock::new();
        let _ = cell.set(key);
        Ok(Self { key: cell, ..self })
    }

    /// The request's deterministic key, derived on first use.
    pub fn key(&self) -> &str {
        self.key
            .get_or_init(|| codec::request_key(&self.request_uri, &self.parameters))
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn parameters(&self) -> &Params {
        &self.parameters
    }

    /// Canonical query-string form of the parameters.
    pub fn parameter_string(&self) -> String {
        self.parameters.encode()
    }

    pub fn estimated_time(&self) -> Duration {
        self.estimated_time
    }

    pub fn sticky(&self) -> bool {
        self.sticky
    }
}

// ---------------------------------------------------------------------------
// QueueEntry
// ---------------------------------------------------------------------------

/// One persisted generation of a request's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store-assigned, strictly increasing. Global insertion order.
    pub index: i64,
    pub key: String,
    pub status: Status,
    pub request_uri: String,
    /// Canonical encoded parameter string.
    pub params: String,
    pub estimated_time: Option<Duration>,
    /// Set when a worker claims the entry.
    pub start_time: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Project this entry as the caller-facing status.
    pub fn to_status(&self) -> BatchStatus {
        BatchStatus {
            key: self.key.clone(),
            status: self.status,
            estimated_time: self.estimated_time,
            started: self.start_time,
            position_in_queue: None,
            eta: None,
        }
    }

    /// Reconstruct the request payload carried by this entry.
    pub fn to_request(&self) -> BatchRequest {
        let request = BatchRequest::from_encoded(&self.request_uri, &self.params);
        match self.estimated_time {
            Some(t) => request.with_estimated_time(t),
            None => request,
        }
    }
}

// ---------------------------------------------------------------------------
// BatchStatus
// ---------------------------------------------------------------------------

/// Status projection of a batch request, as exposed to callers.
///
/// `position_in_queue` and `eta` are only filled by queue-wide queries;
/// point lookups leave them empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub key: String,
    pub status: Status,
    pub estimated_time: Option<Duration>,
    pub started: Option<DateTime<Utc>>,
    pub position_in_queue: Option<usize>,
    pub eta: Option<Duration>,
}

impl BatchStatus {
    pub fn new(key: impl Into<String>, status: Status) -> Self {
        Self {
            key: key.into(),
            status,
            estimated_time: None,
            started: None,
            position_in_queue: None,
            eta: None,
        }
    }

    /// The projection for a key with no queue entry at all.
    pub fn unknown(key: impl Into<String>) -> Self {
        Self::new(key, Status::Unknown)
    }

    /// JSON rendering for status endpoints. Optional fields are omitted
    /// when absent.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("key".into(), self.key.clone().into());
        map.insert("status".into(), self.status.as_str().into());
        if let Some(position) = self.position_in_queue {
            map.insert("positionInQueue".into(), position.into());
        }
        if let Some(eta) = self.eta {
            map.insert("eta".into(), (eta.as_millis() as u64).into());
        }
        if let Some(estimated) = self.estimated_time {
            map.insert(
                "estimatedTime".into(),
                (estimated.as_millis() as u64).into(),
            );
        }
        if let Some(started) = self.started {
            map.insert("started".into(), started.to_rfc3339().into());
        }
        serde_json::Value::Object(map)
    }
}

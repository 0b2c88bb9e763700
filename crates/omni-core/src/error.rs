//! Error types for omni-core
//!
//! Transport failures are kept apart from portal rejections: auto-login
//! retries only the former, and the write-back queue reports both through
//! `on_fail`.

use omni_types::Division;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for omniclient operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Transport Errors
    // ===================
    #[error("{division}: network unreachable: {message}")]
    Transport {
        division: Division,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // ===================
    // Portal Errors
    // ===================
    #[error("{division}: login rejected (HTTP {status})")]
    AuthRejected { division: Division, status: u16 },

    #[error("{division}: server returned HTTP {status}")]
    Server {
        division: Division,
        status: u16,
        body: String,
    },

    #[error("{division}: failed to decode {what}: {message}")]
    Decode {
        division: Division,
        what: &'static str,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No division answered: {}", summarize(.failures))]
    NoDivisionAvailable { failures: Vec<DivisionFailure> },

    // ===================
    // Internal Errors
    // ===================
    #[error(
        "Merge invariant violated: lesson {weekday}/{period} carries division {found}, snapshot declares {declared}"
    )]
    MergeInvariantViolation {
        declared: u32,
        found: u32,
        weekday: String,
        period: String,
    },

    // ===================
    // Store Errors
    // ===================
    #[error("Week store error: {message}")]
    Store { message: String },

    // ===================
    // Config Errors
    // ===================
    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ===================
    // Mutation Errors
    // ===================
    #[error("Invalid mutation: {message}")]
    InvalidMutation { message: String },
}

impl CoreError {
    pub fn transport(division: Division, source: reqwest::Error) -> Self {
        CoreError::Transport {
            division,
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Wrap a store failure, keeping the whole context chain in the message
    pub fn store(error: anyhow::Error) -> Self {
        CoreError::Store {
            message: format!("{:#}", error),
        }
    }

    /// True for connectivity failures (DNS, connect, timeout)
    pub fn is_transport(&self) -> bool {
        matches!(self, CoreError::Transport { .. })
    }

    /// True when every division failed at the transport level
    pub fn is_offline(&self) -> bool {
        match self {
            CoreError::Transport { .. } => true,
            CoreError::NoDivisionAvailable { failures } => {
                !failures.is_empty() && failures.iter().all(|f| f.kind == FailureKind::Transport)
            }
            _ => false,
        }
    }

    /// Division the error is attributed to, if any
    pub fn division(&self) -> Option<Division> {
        match self {
            CoreError::Transport { division, .. }
            | CoreError::AuthRejected { division, .. }
            | CoreError::Server { division, .. }
            | CoreError::Decode { division, .. } => Some(*division),
            _ => None,
        }
    }
}

/// Coarse classification of a per-division failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Rejected,
    Server,
    Decode,
    Other,
}

/// One division's failure inside an otherwise degraded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionFailure {
    pub division: Division,
    pub kind: FailureKind,
    pub message: String,
}

impl DivisionFailure {
    pub fn new(division: Division, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            division,
            kind,
            message: message.into(),
        }
    }

    /// Classify a `CoreError` raised while talking to `division`
    pub fn from_core_error(division: Division, error: &CoreError) -> Self {
        let kind = match error {
            CoreError::Transport { .. } => FailureKind::Transport,
            CoreError::AuthRejected { .. } => FailureKind::Rejected,
            CoreError::Server { .. } => FailureKind::Server,
            CoreError::Decode { .. } => FailureKind::Decode,
            _ => FailureKind::Other,
        };
        Self {
            division: error.division().unwrap_or(division),
            kind,
            message: error.to_string(),
        }
    }
}

fn summarize(failures: &[DivisionFailure]) -> String {
    if failures.is_empty() {
        return "no divisions attempted".to_string();
    }
    failures
        .iter()
        .map(|f| f.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Health of the two sessions after login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedState {
    /// Both divisions authenticated
    Healthy,
    /// One division is unavailable, the other works
    PartialData {
        missing: Vec<Division>,
        reason: String,
    },
    /// Neither division is authenticated
    Offline { reason: String },
}

impl DegradedState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DegradedState::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_healthy()
    }
}

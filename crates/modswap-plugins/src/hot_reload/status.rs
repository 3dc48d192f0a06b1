//! Operator-facing status messages

use serde::{Deserialize, Serialize};

/// How an operation went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    /// Done, with non-fatal problems
    Partial,
    Failure,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Success => write!(f, "success"),
            OperationStatus::Partial => write!(f, "partial"),
            OperationStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Short, human-readable outcome of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: OperationStatus,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Success,
            message: message.into(),
        }
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Partial,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failure,
            message: message.into(),
        }
    }

    /// Success or partial success
    pub fn is_positive(&self) -> bool {
        self.status != OperationStatus::Failure
    }
}

impl std::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Per-module outcome of a bulk operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub entries: Vec<(String, StatusMessage)>,
    /// Modules passed over because they are on the ignore list
    pub ignored: Vec<String>,
}

impl BulkReport {
    pub fn push(&mut self, module: &str, status: StatusMessage) {
        self.entries.push((module.to_string(), status));
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|(_, s)| s.is_positive()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    /// Success when nothing failed or was partial, failure when nothing
    /// succeeded, partial otherwise. An empty report is a success.
    pub fn status(&self) -> OperationStatus {
        let all = |wanted: OperationStatus| self.entries.iter().all(|(_, s)| s.status == wanted);
        if all(OperationStatus::Success) {
            OperationStatus::Success
        } else if all(OperationStatus::Failure) {
            OperationStatus::Failure
        } else {
            OperationStatus::Partial
        }
    }

    /// One-line summary
    pub fn summary(&self, verb: &str) -> StatusMessage {
        let text = format!(
            "{} {} of {} module(s), {} failed, {} ignored",
            verb,
            self.succeeded(),
            self.entries.len(),
            self.failed(),
            self.ignored.len()
        );
        StatusMessage {
            status: self.status(),
            message: text,
        }
    }
}

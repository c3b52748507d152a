//! Execution status reported by the remote engine
//!
//! Inbound messages are decoded into the closed [`ExecutionEvent`] sum type
//! and folded into an [`ExecutionState`]. The remote engine delivers the
//! events of one run in send order; nothing here reorders or deduplicates.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodeId;

/// Maximum number of `node_log` entries retained
pub const LOG_CAPACITY: usize = 500;

/// Events streamed from the remote execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Engine acknowledged the channel
    Connected,

    #[serde(rename_all = "camelCase")]
    PipelineStarted { pipeline_id: String, total_nodes: u32 },

    #[serde(rename_all = "camelCase")]
    NodeExecuting { node_id: NodeId, label: String },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: NodeId,
        label: String,
        execution_time_ms: u64,
    },

    #[serde(rename_all = "camelCase")]
    PipelineCompleted { execution_time_ms: u64 },

    #[serde(rename_all = "camelCase")]
    PipelineError {
        #[serde(default)]
        node_id: Option<NodeId>,
        error: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeLog {
        level: LogLevel,
        label: String,
        message: String,
    },

    /// A message whose `type` is not one of the variants above
    #[serde(skip)]
    Unknown { kind: String },
}

impl ExecutionEvent {
    /// Wire tags of the known variants
    pub const KNOWN_KINDS: [&'static str; 7] = [
        "connected",
        "pipeline_started",
        "node_executing",
        "node_completed",
        "pipeline_completed",
        "pipeline_error",
        "node_log",
    ];

    /// Decode one inbound JSON message
    ///
    /// Unrecognized tags decode to [`ExecutionEvent::Unknown`]; a known tag
    /// with missing or mistyped fields is an error.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(DecodeError::MissingType)?
            .to_string();

        if !Self::KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(Self::Unknown { kind });
        }

        serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
            kind,
            message: e.to_string(),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::PipelineStarted { .. } => "pipeline_started",
            Self::NodeExecuting { .. } => "node_executing",
            Self::NodeCompleted { .. } => "node_completed",
            Self::PipelineCompleted { .. } => "pipeline_completed",
            Self::PipelineError { .. } => "pipeline_error",
            Self::NodeLog { .. } => "node_log",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Why an inbound message could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Message has no string 'type' field")]
    MissingType,

    #[error("Malformed '{kind}' message: {message}")]
    Malformed { kind: String, message: String },
}

/// Severity attached to `node_log` messages
///
/// Engines differ in their level names; anything unrecognized is kept as
/// `Other` so the message itself is not lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "DEBUG", alias = "trace", alias = "TRACE")]
    Debug,
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN", alias = "warning", alias = "WARNING")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
    #[serde(other)]
    Other,
}

/// Execution status of a single node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Idle,
    Executing,
    Completed,
    Error,
}

/// Completed/total node counts for the active run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

/// A retained `node_log` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub label: String,
    pub message: String,
}

/// Reconciled view of the remote engine's reported status
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    node_status: HashMap<NodeId, NodeStatus>,
    node_timings: HashMap<NodeId, u64>,
    progress: Progress,
    active_pipeline: Option<String>,
    last_error: Option<String>,
    last_run_ms: Option<u64>,
    logs: VecDeque<LogEntry>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state
    ///
    /// Returns `true` if anything observable changed.
    pub fn apply(&mut self, event: &ExecutionEvent) -> bool {
        match event {
            ExecutionEvent::Connected => false,
            ExecutionEvent::PipelineStarted {
                pipeline_id,
                total_nodes,
            } => {
                self.node_status.clear();
                self.node_timings.clear();
                self.progress = Progress {
                    completed: 0,
                    total: *total_nodes,
                };
                self.active_pipeline = Some(pipeline_id.clone());
                self.last_error = None;
                self.last_run_ms = None;
                true
            }
            ExecutionEvent::NodeExecuting { node_id, .. } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Executing);
                true
            }
            ExecutionEvent::NodeCompleted {
                node_id,
                execution_time_ms,
                ..
            } => {
                self.node_status.insert(node_id.clone(), NodeStatus::Completed);
                self.node_timings.insert(node_id.clone(), *execution_time_ms);
                self.progress.completed += 1;
                true
            }
            ExecutionEvent::PipelineCompleted { execution_time_ms } => {
                self.active_pipeline = None;
                self.last_run_ms = Some(*execution_time_ms);
                true
            }
            ExecutionEvent::PipelineError { node_id, error } => {
                self.active_pipeline = None;
                self.last_error = Some(error.clone());
                // Other non-terminal nodes keep their last reported status
                if let Some(node_id) = node_id {
                    self.node_status.insert(node_id.clone(), NodeStatus::Error);
                }
                true
            }
            ExecutionEvent::NodeLog {
                level,
                label,
                message,
            } => {
                if self.logs.len() == LOG_CAPACITY {
                    self.logs.pop_front();
                }
                self.logs.push_back(LogEntry {
                    level: *level,
                    label: label.clone(),
                    message: message.clone(),
                });
                true
            }
            ExecutionEvent::Unknown { .. } => false,
        }
    }

    /// Status of a node; nodes never reported are idle
    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.node_status.get(node_id).copied().unwrap_or_default()
    }

    pub fn node_status(&self) -> &HashMap<NodeId, NodeStatus> {
        &self.node_status
    }

    pub fn execution_time_ms(&self, node_id: &str) -> Option<u64> {
        self.node_timings.get(node_id).copied()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn active_pipeline(&self) -> Option<&str> {
        self.active_pipeline.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.active_pipeline.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_run_ms(&self) -> Option<u64> {
        self.last_run_ms
    }

    pub fn logs(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(total: u32) -> ExecutionEvent {
        ExecutionEvent::PipelineStarted {
            pipeline_id: "run-1".to_string(),
            total_nodes: total,
        }
    }

    fn executing(id: &str) -> ExecutionEvent {
        ExecutionEvent::NodeExecuting {
            node_id: id.to_string(),
            label: id.to_uppercase(),
        }
    }

    fn completed(id: &str) -> ExecutionEvent {
        ExecutionEvent::NodeCompleted {
            node_id: id.to_string(),
            label: id.to_uppercase(),
            execution_time_ms: 12,
        }
    }

    #[test]
    fn test_decode_known_event() {
        let event = ExecutionEvent::decode(
            r#"{"type":"node_completed","nodeId":"n1","label":"Add","executionTimeMs":42}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ExecutionEvent::NodeCompleted {
                node_id: "n1".to_string(),
                label: "Add".to_string(),
                execution_time_ms: 42,
            }
        );
    }

    #[test]
    fn test_decode_node_log_levels() {
        let level = |raw: &str| {
            let line = format!(
                r#"{{"type":"node_log","level":"{}","label":"Add","message":"hi"}}"#,
                raw
            );
            match ExecutionEvent::decode(&line).unwrap() {
                ExecutionEvent::NodeLog { level, .. } => level,
                other => panic!("unexpected event: {:?}", other),
            }
        };
        assert_eq!(level("info"), LogLevel::Info);
        assert_eq!(level("INFO"), LogLevel::Info);
        assert_eq!(level("warning"), LogLevel::Warn);
        assert_eq!(level("error"), LogLevel::Error);
        assert_eq!(level("success"), LogLevel::Other);
    }

    #[test]
    fn test_decode_pipeline_error_without_node() {
        let event = ExecutionEvent::decode(r#"{"type":"pipeline_error","error":"boom"}"#).unwrap();
        assert_eq!(
            event,
            ExecutionEvent::PipelineError {
                node_id: None,
                error: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_unknown_tag() {
        let event = ExecutionEvent::decode(r#"{"type":"heartbeat","seq":3}"#).unwrap();
        assert_eq!(
            event,
            ExecutionEvent::Unknown {
                kind: "heartbeat".to_string()
            }
        );
        assert_eq!(event.kind(), "heartbeat");
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let err = ExecutionEvent::decode(r#"{"type":"node_executing","label":"x"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { ref kind, .. } if kind == "node_executing"));

        assert_eq!(
            ExecutionEvent::decode(r#"{"nodeId":"n1"}"#).unwrap_err(),
            DecodeError::MissingType
        );
        assert!(matches!(
            ExecutionEvent::decode("not json").unwrap_err(),
            DecodeError::InvalidJson(_)
        ));
    }

    #[test]
    fn test_run_lifecycle() {
        let mut state = ExecutionState::new();
        state.apply(&started(2));
        assert_eq!(state.progress(), Progress { completed: 0, total: 2 });
        assert_eq!(state.active_pipeline(), Some("run-1"));

        state.apply(&executing("a"));
        assert_eq!(state.status("a"), NodeStatus::Executing);

        state.apply(&completed("a"));
        assert_eq!(state.status("a"), NodeStatus::Completed);
        assert_eq!(state.execution_time_ms("a"), Some(12));
        assert_eq!(state.progress().completed, 1);

        state.apply(&ExecutionEvent::PipelineCompleted {
            execution_time_ms: 30,
        });
        assert!(!state.is_running());
        assert_eq!(state.last_run_ms(), Some(30));
        assert_eq!(state.status("never-seen"), NodeStatus::Idle);
    }

    #[test]
    fn test_pipeline_error_marks_only_named_node() {
        let mut state = ExecutionState::new();
        state.apply(&started(3));
        state.apply(&completed("a"));
        state.apply(&executing("b"));
        state.apply(&executing("c"));
        state.apply(&ExecutionEvent::PipelineError {
            node_id: Some("c".to_string()),
            error: "division by zero".to_string(),
        });

        assert_eq!(state.status("a"), NodeStatus::Completed);
        assert_eq!(state.status("b"), NodeStatus::Executing);
        assert_eq!(state.status("c"), NodeStatus::Error);
        assert_eq!(state.active_pipeline(), None);
        assert_eq!(state.last_error(), Some("division by zero"));
    }

    #[test]
    fn test_pipeline_started_resets_previous_run() {
        let mut state = ExecutionState::new();
        state.apply(&started(1));
        state.apply(&completed("a"));
        state.apply(&started(4));

        assert!(state.node_status().is_empty());
        assert_eq!(state.progress(), Progress { completed: 0, total: 4 });
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let mut state = ExecutionState::new();
        for i in 0..(LOG_CAPACITY + 5) {
            state.apply(&ExecutionEvent::NodeLog {
                level: LogLevel::Info,
                label: "printer".to_string(),
                message: format!("line {}", i),
            });
        }
        assert_eq!(state.logs().count(), LOG_CAPACITY);
        assert_eq!(state.logs().next().unwrap().message, "line 5");
    }

    #[test]
    fn test_unknown_and_connected_change_nothing() {
        let mut state = ExecutionState::new();
        assert!(!state.apply(&ExecutionEvent::Connected));
        assert!(!state.apply(&ExecutionEvent::Unknown {
            kind: "x".to_string()
        }));
    }
}

//! Outbound messages on the execution channel
//!
//! Inbound messages are [`pipeline_engine::ExecutionEvent`]. Both directions
//! are JSON objects discriminated by a `type` field, one per line.

use pipeline_engine::PipelineDefinition;
use serde::{Deserialize, Serialize};

/// Message sent from the client to the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run a pipeline definition
    ExecutePipeline { pipeline: PipelineDefinition },

    /// Stop a running pipeline
    #[serde(rename_all = "camelCase")]
    StopPipeline { pipeline_id: String },

    Ping,
}

impl ClientMessage {
    /// Serialize to a single JSON line (without the trailing newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutePipeline { .. } => "execute_pipeline",
            Self::StopPipeline { .. } => "stop_pipeline",
            Self::Ping => "ping",
        }
    }
}

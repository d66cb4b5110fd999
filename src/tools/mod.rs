//! Pluggable evidence-gathering tools for the research loop.

pub mod search;

use async_trait::async_trait;

use crate::llm::UpstreamError;

/// Output of a tool invocation: one source and its retrieved text.
///
/// Exactly one source per invocation, by construction. Retrieval failures
/// are carried in `content` instead of dropping the entry, so the shape is
/// uniform either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Where the content came from
    pub url: String,

    /// Extracted text, or a failure description
    pub content: String,
}

impl ToolOutput {
    /// Render as prompt text for the integration agent.
    pub fn render(&self) -> String {
        format!("{}:\n{}", self.url, self.content)
    }
}

/// A capability the loop can invoke with a plan and query to gather
/// evidence. The loop itself is tool-agnostic.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Capability summary interpolated into the planning prompt.
    fn description(&self) -> &str;

    /// Run the tool against the current plan.
    async fn use_tool(&self, plan: &str, query: &str) -> Result<ToolOutput, UpstreamError>;
}

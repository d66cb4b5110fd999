//! Core research loop implementation.
//!
//! A fixed-depth improve-and-recheck cycle: plan, run the tool, integrate
//! the evidence into a response, verify the response against the query, and
//! either stop or loop back with this iteration's state as the next
//! iteration's priors. Bounding the iterations guarantees termination
//! regardless of how the completions behave.

use std::sync::Arc;

use crate::llm::{CompletionClient, FieldSchema, UpstreamError};
use crate::tools::{Tool, ToolOutput};

use super::prompt::{integration_prompt, planning_prompt};

/// The loop always terminates within this many cycles.
const ITERATION_CAP: usize = 5;

const CHECKER_SCHEMA: FieldSchema = FieldSchema {
    function_name: "response_checker",
    function_description: "Check if the response meets the requirements",
    field: "meets_requirements",
    field_description: "Check if the response meets the requirements of the query based on \
        the following: 1. The response should be relevant to the query. 2. The response \
        should be coherent and well-structured with citations. 3. The response should be \
        comprehensive and address the query in its entirety. Return 'yes' if the response \
        meets the requirements and 'no' otherwise.",
};

/// The research agent: drives the bounded plan/tool/integrate/verify cycle.
pub struct Agent {
    llm: Arc<dyn CompletionClient>,
    tool: Arc<dyn Tool>,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The last synthesized response; the final answer whether or not the
    /// checker ever accepted it
    pub response: String,

    /// How many iterations ran
    pub iterations: usize,

    /// Whether the checker accepted the final response
    pub satisfied: bool,
}

impl Agent {
    /// Create a new agent sharing the given completion client and tool.
    pub fn new(llm: Arc<dyn CompletionClient>, tool: Arc<dyn Tool>) -> Self {
        Self { llm, tool }
    }

    /// Run the loop for a query. Only the immediately preceding plan, tool
    /// output, and response are retained between iterations.
    pub async fn run(&self, query: &str) -> Result<RunOutcome, UpstreamError> {
        let mut plan: Option<String> = None;
        let mut output: Option<ToolOutput> = None;
        let mut response: Option<String> = None;
        let mut satisfied = false;
        let mut iterations = 0;

        while !satisfied && iterations < ITERATION_CAP {
            iterations += 1;
            tracing::debug!("Research iteration {}", iterations);

            let rendered_output = output.as_ref().map(ToolOutput::render);

            let new_plan = self
                .run_planning_agent(
                    query,
                    plan.as_deref(),
                    rendered_output.as_deref(),
                    response.as_deref(),
                )
                .await?;

            let new_output = self.tool.use_tool(&new_plan, query).await?;
            let new_response = self
                .run_integration_agent(query, &new_plan, &new_output)
                .await?;

            satisfied = self.check_response(&new_response, query).await?;

            plan = Some(new_plan);
            output = Some(new_output);
            response = Some(new_response);
        }

        Ok(RunOutcome {
            response: response.unwrap_or_default(),
            iterations,
            satisfied,
        })
    }

    async fn run_planning_agent(
        &self,
        query: &str,
        plan: Option<&str>,
        outputs: Option<&str>,
        feedback: Option<&str>,
    ) -> Result<String, UpstreamError> {
        let system_prompt = planning_prompt(self.tool.description(), plan, outputs, feedback);
        let content = self.llm.complete_free_text(&system_prompt, query).await?;

        tracing::info!("Planning agent: {}", content);
        Ok(content)
    }

    async fn run_integration_agent(
        &self,
        query: &str,
        plan: &str,
        output: &ToolOutput,
    ) -> Result<String, UpstreamError> {
        let system_prompt = integration_prompt(plan, &output.render());
        let content = self.llm.complete_free_text(&system_prompt, query).await?;

        tracing::info!("Integration agent: {}", content);
        Ok(content)
    }

    async fn check_response(&self, response: &str, query: &str) -> Result<bool, UpstreamError> {
        let message = format!("Response: {} \n Query: {}", response, query);
        let verdict = self.llm.complete_structured(&message, &CHECKER_SCHEMA).await?;

        tracing::info!("Response checker: {}", verdict);

        // Exact match only; "Yes." or any explanation counts as not met.
        Ok(verdict == "yes")
    }
}

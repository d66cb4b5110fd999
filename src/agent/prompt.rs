//! Prompt templates for the planning and integration agents.

/// Build the planning agent's system prompt. Priors from the previous
/// iteration are rendered as `None` on the first pass.
pub fn planning_prompt(
    tool_specs: &str,
    plan: Option<&str>,
    outputs: Option<&str>,
    feedback: Option<&str>,
) -> String {
    format!(
        r#"You are a research planning agent. Given the user's query, produce a concise plan
for gathering the evidence needed to answer it using the tool described below.

## Tool
{tool_specs}

## Previous Plan
{plan}

## Previous Tool Outputs
{outputs}

## Previous Response (feedback)
{feedback}

If a previous plan, outputs, or response are present, revise the plan to address whatever
the previous response was missing: fill gaps, correct errors, and target sources the
previous iteration failed to find. Otherwise produce an initial plan.

Reply with the plan only."#,
        tool_specs = tool_specs,
        plan = plan.unwrap_or("None"),
        outputs = outputs.unwrap_or("None"),
        feedback = feedback.unwrap_or("None"),
    )
}

/// Build the integration agent's system prompt.
pub fn integration_prompt(plan: &str, outputs: &str) -> String {
    format!(
        r#"You are an integration agent. Synthesize the tool outputs below into a direct,
comprehensive answer to the user's query, following the plan. Cite the source URL for
every claim drawn from the outputs. If the outputs describe a retrieval failure, say so
and answer as best you can from what remains.

## Plan
{plan}

## Tool Outputs
{outputs}"#,
        plan = plan,
        outputs = outputs,
    )
}

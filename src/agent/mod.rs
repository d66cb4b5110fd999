//! The plan / tool-use / integrate / verify research loop.

mod agent_loop;
pub mod prompt;

pub use agent_loop::{Agent, RunOutcome};

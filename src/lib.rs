//! # Research Agent
//!
//! An iterative web research agent built on a bounded
//! plan / tool-use / integrate / verify loop.
//!
//! This library provides:
//! - A completion client for free-text and schema-forced generation
//! - A web search-and-scrape tool (serper.dev + page scraping)
//! - The orchestration loop that drives them
//!
//! ## Architecture
//!
//! Each iteration of the loop:
//! 1. Asks the planning agent for a plan, given last iteration's state
//! 2. Runs the tool against the plan to gather one page of evidence
//! 3. Asks the integration agent to synthesize a response
//! 4. Asks the checker whether the response satisfies the query
//!
//! The loop exits on a positive verdict or after five iterations,
//! whichever comes first; the last response is the answer either way.
//!
//! ## Example
//!
//! ```rust,ignore
//! use research_agent::{agent::Agent, config::Config};
//!
//! let config = Config::load()?;
//! let llm = Arc::new(OpenAiClient::new(&config));
//! let tool = Arc::new(WebSearcher::new(&config, llm.clone()));
//! let outcome = Agent::new(llm, tool).run("your question").await?;
//! ```

pub mod agent;
pub mod config;
pub mod llm;
pub mod tools;

pub use config::Config;

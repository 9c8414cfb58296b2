use crate::config::Config;
use crate::schema;
use agent::callbacks::MessageLogger;
use agent::llm;
use agent::tools::{DuckDuckGo, RetryingSearch, SaveTool, SearchTool, WikiTool, Wikipedia};
use agent::{Agent, AgentBuilder, Result};
use std::fs::File;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");

pub fn system_prompt() -> Result<String> {
    Ok(SYSTEM_PROMPT.replace("{format_instructions}", &schema::format_instructions()?))
}

/// The research agent: web search, Wikipedia and file saving, answering in
/// the [`schema::ResearchResponse`] shape.
pub fn build_agent(llm: Arc<dyn llm::LLM + Send + Sync>, config: &Config) -> Result<Agent> {
    let mut builder = AgentBuilder::new()
        .system_prompt(system_prompt()?)
        .llm(llm)
        .tool(SearchTool::new(RetryingSearch::new(DuckDuckGo::new()?)))
        .tool(WikiTool::new(Wikipedia::new()?))
        .tool(SaveTool::new(config.output_dir.clone()))
        .max_iterations(config.max_iterations);

    if let Some(path) = &config.transcript {
        builder = builder.callback(MessageLogger::new("Research transcript", File::create(path)?)?);
    }

    builder.build()
}

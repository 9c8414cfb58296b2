use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};
use tracing::debug;

mod save;
pub use save::{DEFAULT_FILENAME, SaveTool};

pub mod search;
pub use search::{DuckDuckGo, RetryingSearch, SearchBackend, SearchTool};

pub mod wiki;
pub use wiki::{WikiTool, Wikipedia};

pub struct ToolDefinition {
    pub name: String,
    pub desc: String,
    pub params: serde_json::Value,
}

impl ToolDefinition {
    pub fn new<P: JsonSchema>(name: &str, desc: &str) -> Result<Self> {
        let schema = schema_for!(P);
        let params = serde_json::to_value(&schema.schema)?;
        Ok(Self {
            name: name.to_string(),
            desc: desc.to_string(),
            params,
        })
    }
}

#[derive(Clone, Debug, std::hash::Hash)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

impl ToolCall {
    pub fn args<O: for<'de> serde::Deserialize<'de>>(&self) -> Result<O> {
        let args = serde_json::from_str(&self.args)?;
        Ok(args)
    }

    /// Decodes the arguments, or explains the mismatch to the model so the
    /// run can continue.
    pub fn args_or_fallback<O: for<'de> serde::Deserialize<'de>>(
        &self,
    ) -> std::result::Result<O, ToolOutput> {
        self.args().map_err(|err| {
            ToolOutput::Fallback(format!("Invalid arguments for {}: {}", self.name, err))
        })
    }

    /// Answers this call with a tool's output.
    pub fn observe(&self, output: ToolOutput) -> Message {
        if output.is_fallback() {
            debug!(tool = %self.name, output = %output.text(), "tool returned a fallback");
        }
        self.respond(output)
    }

    /// Wraps a result as the tool message answering this call.
    pub fn respond(&self, result: impl Into<String>) -> Message {
        Message::Tool {
            id: self.id.clone(),
            name: self.name.clone(),
            result: result.into(),
        }
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {} ({})\n\t- `{}`\n\n", self.name, self.id, self.args)
    }
}

/// What a tool hands back to the agent. The agent only ever sees text, so
/// failures are carried as a fallback message rather than an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    Success(String),
    Fallback(String),
}

impl ToolOutput {
    pub fn text(&self) -> &str {
        match self {
            ToolOutput::Success(text) | ToolOutput::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ToolOutput::Fallback(_))
    }
}

impl From<ToolOutput> for String {
    fn from(output: ToolOutput) -> Self {
        match output {
            ToolOutput::Success(text) | ToolOutput::Fallback(text) => text,
        }
    }
}

/// Keeps at most `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
pub trait Tool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke(&mut self, args: &ToolCall, messages: Vec<Message>) -> Result<Vec<Message>>;
}

#[async_trait]
pub trait FunctionalTool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke_fn(&mut self, args: &ToolCall) -> Result<Message>;
}

#[async_trait]
impl<T> Tool for T
where
    T: FunctionalTool + Send + Sync,
{
    fn definition(&self) -> Result<ToolDefinition> {
        FunctionalTool::definition(self)
    }

    async fn invoke(
        &mut self,
        args: &ToolCall,
        mut messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let result = FunctionalTool::invoke_fn(self, args).await?;
        messages.push(result);
        Ok(messages)
    }
}

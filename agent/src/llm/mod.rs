use crate::Result;
use crate::tools::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};

mod openai;
pub use openai::{ClientConfig, OpenAI};

/// One piece of a structured model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentPart {
    Text(String),
    Block { kind: String, text: Option<String> },
}

/// Model output, either a plain string or a sequence of typed chunks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Concatenates every textual part in order. Blocks without text are skipped.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text(text) => Some(text.as_str()),
                    ContentPart::Block { text, .. } => text.as_deref(),
                })
                .collect(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

#[derive(Clone, Debug, Hash)]
pub enum Message {
    User(String),
    Assistant(Content, Vec<ToolCall>),
    System(String),
    Tool {
        id: String,
        name: String,
        result: String,
    },
}

impl Message {
    pub fn get_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::System(content) => write!(f, "#### System\n\n{}\n\n", content),
            Message::User(content) => write!(f, "#### User\n\n{}\n\n", content),
            Message::Assistant(content, tool_calls) => {
                write!(f, "#### Assistant\n\n{}\n\n", content.text())?;
                for call in tool_calls {
                    write!(f, "{}", call)?;
                }
                Ok(())
            }
            Message::Tool { id, name, result } => {
                write!(f, "#### Tool `{}` ({})\n\n{}\n\n", name, id, result)
            }
        }
    }
}

pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

pub struct CompletionResponse {
    pub content: Content,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait LLM {
    async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse>;
}

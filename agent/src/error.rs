use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("Http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    /// Whether the model backend asked us to back off, either through the
    /// typed variant or through the usual quota markers in the error text.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited(_) => true,
            other => looks_quota_exhausted(&other.to_string()),
        }
    }
}

pub(crate) fn looks_quota_exhausted(text: &str) -> bool {
    let text = text.to_lowercase();
    ["429", "resourceexhausted", "resource_exhausted", "quota"]
        .iter()
        .any(|marker| text.contains(marker))
}

use crate::llm::Message;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper, looks_rate_limited};
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition, ToolOutput, truncate_chars};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 4;
const ERROR_PREVIEW_CHARS: usize = 100;

pub const NO_RESULTS: &str = "No good DuckDuckGo Search Result was found";
pub const EXHAUSTED: &str = "Search is currently unavailable because of rate limiting. \
Try the wiki tool for this information instead.";

#[async_trait]
pub trait SearchBackend {
    async fn search(&self, query: &str) -> Result<String>;
}

/// Scrapes the DuckDuckGo HTML endpoint, which needs no API key.
pub struct DuckDuckGo {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGo {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; research-assistant/0.1)")
                .build()?,
            endpoint: DUCKDUCKGO_URL.to_string(),
        })
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGo {
    async fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?;

        // DuckDuckGo answers 202 instead of 429 when it throttles.
        let status = response.status();
        if status == StatusCode::ACCEPTED || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("{} Ratelimit", status.as_u16())));
        }
        let html = response.error_for_status()?.text().await?;
        read_results_page(&html)
    }
}

fn read_results_page(html: &str) -> Result<String> {
    if html.contains("anomaly-modal") {
        return Err(Error::RateLimited(
            "DuckDuckGo answered with a bot challenge".to_string(),
        ));
    }
    if html.trim().is_empty() {
        return Err(Error::SearchError(
            "DuckDuckGo returned an empty page".to_string(),
        ));
    }

    let snippets = extract_snippets(html, MAX_RESULTS);
    if snippets.is_empty() {
        Ok(NO_RESULTS.to_string())
    } else {
        Ok(snippets.join("\n"))
    }
}

fn extract_snippets(html: &str, max: usize) -> Vec<String> {
    html.split("class=\"result__body\"")
        .skip(1)
        .filter_map(|chunk| {
            let title = tag_text(chunk, "class=\"result__a\"")?;
            Some(match tag_text(chunk, "class=\"result__snippet\"") {
                Some(snippet) => format!("{}: {}", title, snippet),
                None => title,
            })
        })
        .take(max)
        .collect()
}

/// Text of the element whose opening tag contains `marker`, with nested
/// tags removed and entities decoded.
fn tag_text(chunk: &str, marker: &str) -> Option<String> {
    let after = chunk.split_once(marker)?.1;
    let inner = after.split_once('>')?.1;
    let inner = inner.split_once("</a>").map_or(inner, |(inner, _)| inner);
    let text = html_decode(&strip_tags(inner)).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Retries rate-limited searches with a linear backoff. Every outcome,
/// including exhaustion, is a string the agent can read.
pub struct RetryingSearch<B, S = TokioSleeper> {
    backend: B,
    sleeper: S,
    policy: RetryPolicy,
}

impl<B: SearchBackend> RetryingSearch<B> {
    pub fn new(backend: B) -> Self {
        Self::with_sleeper(backend, TokioSleeper)
    }
}

impl<B: SearchBackend, S: Sleeper> RetryingSearch<B, S> {
    pub fn with_sleeper(backend: B, sleeper: S) -> Self {
        Self {
            backend,
            sleeper,
            policy: RetryPolicy::search(),
        }
    }

    pub async fn run(&self, query: &str) -> ToolOutput {
        for attempt in 1..=self.policy.max_attempts {
            let err = match self.backend.search(query).await {
                Ok(text) => return ToolOutput::Success(text),
                Err(err) => err.to_string(),
            };

            if !looks_rate_limited(&err) {
                warn!(error = %err, "search failed");
                return ToolOutput::Fallback(format!(
                    "Search error: {}",
                    truncate_chars(&err, ERROR_PREVIEW_CHARS)
                ));
            }

            if attempt < self.policy.max_attempts {
                let delay = self.policy.backoff.delay(attempt);
                warn!(attempt, delay_secs = delay.as_secs(), "search rate limited, backing off");
                self.sleeper.sleep(delay).await;
            }
        }

        warn!("search rate limit persisted after all attempts");
        ToolOutput::Fallback(EXHAUSTED.to_string())
    }
}

#[derive(Deserialize, JsonSchema)]
struct QueryArgs {
    /// what to look up
    query: String,
}

pub struct SearchTool<B, S = TokioSleeper>(RetryingSearch<B, S>);

impl<B, S> SearchTool<B, S> {
    pub fn new(search: RetryingSearch<B, S>) -> Box<Self> {
        Box::new(Self(search))
    }
}

#[async_trait]
impl<B, S> FunctionalTool for SearchTool<B, S>
where
    B: SearchBackend + Send + Sync,
    S: Sleeper + Send + Sync,
{
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<QueryArgs>("search", "Search the web for information")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: QueryArgs = match call.args_or_fallback() {
            Ok(args) => args,
            Err(fallback) => return Ok(call.observe(fallback)),
        };
        debug!(query = %args.query, "web search");
        Ok(call.observe(self.0.run(&args.query).await))
    }
}

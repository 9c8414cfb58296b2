use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition, ToolOutput, truncate_chars};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";
const MAX_QUERY_CHARS: usize = 300;

pub const NO_RESULTS: &str = "No good Wikipedia Search Result was found";

#[derive(Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    query: ExtractQuery,
}

#[derive(Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

/// MediaWiki lookup that keeps only the top hits and a short prefix of
/// their summaries, to keep tool output cheap in tokens.
pub struct Wikipedia {
    client: reqwest::Client,
    api_url: String,
    top_k_results: usize,
    doc_content_chars_max: usize,
}

impl Wikipedia {
    pub fn new() -> Result<Self> {
        Self::with_api_url(WIKIPEDIA_API)
    }

    /// Points the lookup at another MediaWiki `api.php`.
    pub fn with_api_url(api_url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("research-assistant/0.1 (command-line research tool)")
                .build()?,
            api_url: api_url.to_string(),
            top_k_results: 1,
            doc_content_chars_max: 100,
        })
    }

    fn search_params(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("list", "search".to_string()),
            ("format", "json".to_string()),
            ("srsearch", query.to_string()),
            ("srlimit", self.top_k_results.to_string()),
        ]
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<String>> {
        let response: SearchResponse = self
            .client
            .get(&self.api_url)
            .query(&self.search_params(query))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .query
            .search
            .into_iter()
            .map(|hit| hit.title)
            .collect())
    }

    async fn summary(&self, title: &str) -> Result<Option<(String, String)>> {
        let response: ExtractResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("titles", title),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .query
            .pages
            .into_values()
            .find_map(|page| page.extract.map(|extract| (page.title, extract))))
    }

    pub async fn lookup(&self, query: &str) -> Result<String> {
        let query = truncate_chars(query, MAX_QUERY_CHARS);
        let mut pages = Vec::new();
        for title in self.search_titles(&query).await? {
            if let Some(page) = self.summary(&title).await? {
                pages.push(page);
            }
        }
        Ok(format_pages(&pages, self.doc_content_chars_max))
    }

    pub async fn run(&self, query: &str) -> ToolOutput {
        match self.lookup(query).await {
            Ok(text) => ToolOutput::Success(text),
            Err(err) => {
                warn!(error = %err, "wikipedia lookup failed");
                ToolOutput::Fallback(format!(
                    "Wikipedia lookup failed: {}",
                    truncate_chars(&err.to_string(), 100)
                ))
            }
        }
    }
}

fn format_pages(pages: &[(String, String)], max_chars: usize) -> String {
    if pages.is_empty() {
        return NO_RESULTS.to_string();
    }
    let joined = pages
        .iter()
        .map(|(title, summary)| format!("Page: {}\nSummary: {}", title, summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, max_chars)
}

#[derive(Deserialize, JsonSchema)]
struct WikiArgs {
    /// topic to look up on Wikipedia
    query: String,
}

pub struct WikiTool(Wikipedia);

impl WikiTool {
    pub fn new(wikipedia: Wikipedia) -> Box<Self> {
        Box::new(Self(wikipedia))
    }
}

#[async_trait]
impl FunctionalTool for WikiTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WikiArgs>("wiki", "Search Wikipedia for information")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WikiArgs = match call.args_or_fallback() {
            Ok(args) => args,
            Err(fallback) => return Ok(call.observe(fallback)),
        };
        debug!(query = %args.query, "wikipedia lookup");
        Ok(call.observe(self.0.run(&args.query).await))
    }
}

use agent::llm::ClientConfig;
use agent::{DEFAULT_MAX_ITERATIONS, Error, Result};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Clone, Debug)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub output_dir: PathBuf,
    pub max_iterations: usize,
    pub transcript: Option<PathBuf>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment. A `.env`
    /// that exists but cannot be read or parsed is an error.
    pub fn from_env() -> Result<Self> {
        env_file_loaded(dotenvy::dotenv())?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("GOOGLE_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .ok_or_else(|| {
                Error::ConfigError(
                    "GOOGLE_API_KEY is not set (add it to .env or the environment)".to_string(),
                )
            })?;

        let max_iterations = match get("RESEARCH_MAX_ITERATIONS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    Error::ConfigError(format!(
                        "RESEARCH_MAX_ITERATIONS must be a positive integer, got {:?}",
                        raw
                    ))
                })?,
            None => DEFAULT_MAX_ITERATIONS,
        };

        Ok(Self {
            api_key,
            api_base: get("RESEARCH_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: get("RESEARCH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            output_dir: get("RESEARCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            max_iterations,
            transcript: None,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            model: self.model.clone(),
        }
    }
}

fn env_file_loaded(result: dotenvy::Result<PathBuf>) -> Result<()> {
    match result {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(Error::ConfigError(format!("failed to load .env: {}", err))),
    }
}

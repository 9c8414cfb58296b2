mod config;
mod driver;
mod markdown;
mod render;
mod research;
mod schema;

use agent::retry::TokioSleeper;
use agent::{Error, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "research", version, about = "Answers a question with a web and Wikipedia research agent")]
struct Cli {
    /// Model name, overriding RESEARCH_MODEL
    #[arg(long)]
    model: Option<String>,
    /// Directory the save tool writes into, overriding RESEARCH_OUTPUT_DIR
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Write a markdown transcript of every agent step to this file
    #[arg(long)]
    transcript: Option<PathBuf>,
    /// Question to research; prompted for when omitted
    question: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn ask() -> Result<Option<String>> {
    let mut editor = rustyline::DefaultEditor::new()
        .map_err(|e| Error::IOError(std::io::Error::other(e.to_string())))?;
    let prompt = format!("{} ", "Ask a question about anything:".green().bold());
    match editor.readline(&prompt) {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Eof | ReadlineError::Interrupted) => Ok(None),
        Err(ReadlineError::Io(e)) => Err(e.into()),
        Err(e) => Err(Error::IOError(std::io::Error::other(e.to_string()))),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = config::Config::from_env()?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    config.transcript = cli.transcript;
    info!(model = %config.model, api_base = %config.api_base, "configuration loaded");

    let llm = agent::llm::OpenAI::new(config.client_config());
    let agent = research::build_agent(llm, &config)?;

    let mut console = render::Console::stdout();
    console.banner(&config.model)?;

    let question = if cli.question.is_empty() {
        match ask()? {
            Some(question) => question,
            None => return Ok(ExitCode::SUCCESS),
        }
    } else {
        cli.question.join(" ")
    };
    let question = question.trim();
    if question.is_empty() {
        console.failure("No question given.")?;
        return Ok(ExitCode::FAILURE);
    }

    let mut driver = driver::Driver::new(agent, TokioSleeper, console);
    match driver.run(question).await? {
        driver::Outcome::Rendered(_) => Ok(ExitCode::SUCCESS),
        driver::Outcome::RetriesExhausted | driver::Outcome::Unparsable => Ok(ExitCode::FAILURE),
    }
}

use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, ToolCall, ToolDefinition, ToolOutput};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_FILENAME: &str = "research_output.txt";

#[derive(Deserialize, JsonSchema)]
struct SaveArgs {
    /// text to write
    data: String,
    /// name of the file, prefixed with the current time when saved
    #[serde(default)]
    filename: Option<String>,
}

pub struct SaveTool {
    dir: PathBuf,
}

impl SaveTool {
    pub fn new(dir: impl Into<PathBuf>) -> Box<Self> {
        Box::new(Self { dir: dir.into() })
    }

    /// Writes `data` to `<dir>/<YYYY-MM-DD_HH-MM-SS>_<filename>`. Two saves in
    /// the same second with the same name land on the same file.
    pub fn save_at(
        &self,
        data: &str,
        filename: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<PathBuf> {
        let path = self.dir.join(timestamped_name(filename, now));
        std::fs::write(&path, data)?;
        Ok(path)
    }

    fn save(&self, data: &str, filename: Option<&str>) -> ToolOutput {
        match self.save_at(data, filename, Local::now().naive_local()) {
            Ok(path) => {
                info!(path = %path.display(), "saved research output");
                ToolOutput::Success(format!("Data saved to {}", path.display()))
            }
            Err(err) => {
                warn!(error = %err, "failed to save research output");
                ToolOutput::Fallback(format!("Failed to save data: {}", err))
            }
        }
    }
}

fn timestamped_name(filename: Option<&str>, now: NaiveDateTime) -> String {
    // only the last path component is honoured so saves stay inside `dir`
    let filename = filename
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_FILENAME);
    format!("{}_{}", now.format("%Y-%m-%d_%H-%M-%S"), filename)
}

#[async_trait]
impl FunctionalTool for SaveTool {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<SaveArgs>("save_to_txt", "Save data to a text file")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: SaveArgs = match call.args_or_fallback() {
            Ok(args) => args,
            Err(fallback) => return Ok(call.observe(fallback)),
        };
        Ok(call.observe(self.save(&args.data, args.filename.as_deref())))
    }
}

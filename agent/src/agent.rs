use crate::callbacks;
use crate::llm;
use crate::llm::{Content, Message};
use crate::tools;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

/// Stops once the model answers without asking for a tool.
pub struct FinalAnswer;

impl StopCondition for FinalAnswer {
    fn done(&self, history: &[llm::Message]) -> bool {
        matches!(history.last(), Some(Message::Assistant(_, calls)) if calls.is_empty())
    }
}

type Tool = Box<dyn tools::Tool + Send>;
type Callback = Box<dyn callbacks::Callback + Send>;

pub struct AgentOutput {
    /// Content of the last assistant message, as the model produced it.
    pub output: Content,
    pub messages: Vec<Message>,
}

pub struct Agent {
    llm: Arc<dyn llm::LLM + Send + Sync>,
    system_prompt: Option<String>,
    tools: HashMap<String, Tool>,
    callbacks: Vec<Callback>,
    tool_defs: Vec<tools::ToolDefinition>,
    stop_condition: Box<dyn StopCondition + Send>,
    max_iterations: usize,
}

impl Agent {
    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        mut messages: Vec<llm::Message>,
    ) -> Result<Vec<llm::Message>> {
        let Some(tool) = self.tools.get_mut(&tool_call.name) else {
            warn!(tool = %tool_call.name, "model requested an unknown tool");
            let names = self
                .tool_defs
                .iter()
                .map(|def| def.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            messages.push(tool_call.respond(format!(
                "{} is not a valid tool, try one of [{}].",
                tool_call.name, names
            )));
            return Ok(messages);
        };

        debug!(tool = %tool_call.name, args = %tool_call.args, "invoking tool");
        tool.invoke(tool_call, messages).await
    }

    /// Answers a single question, starting from the system prompt.
    pub async fn invoke(&mut self, input: &str) -> Result<AgentOutput> {
        let mut messages = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::System(prompt.clone()));
        }
        messages.push(Message::User(input.to_string()));
        self.run(messages).await
    }

    pub async fn run(&mut self, mut messages: Vec<llm::Message>) -> Result<AgentOutput> {
        for step in 0..self.max_iterations {
            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    tools: &self.tool_defs,
                })
                .await?;
            debug!(step, tool_calls = next.tool_calls.len(), "agent step");

            messages.push(llm::Message::Assistant(
                next.content.clone(),
                next.tool_calls.clone(),
            ));

            for tool_call in &next.tool_calls {
                messages = self.execute_tool_call(tool_call, messages).await?;
            }

            for callback in &mut self.callbacks {
                messages = callback.call(messages).await?;
            }

            if self.stop_condition.done(&messages) {
                return Ok(AgentOutput {
                    output: next.content,
                    messages,
                });
            }
        }

        warn!(max_iterations = self.max_iterations, "agent hit its iteration limit");
        Ok(AgentOutput {
            output: Content::from(ITERATION_LIMIT_OUTPUT),
            messages,
        })
    }
}

pub struct AgentBuilder {
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    system_prompt: Option<String>,
    tools: Vec<Tool>,
    callbacks: Vec<Callback>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_iterations: usize,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            system_prompt: None,
            tools: Vec::new(),
            callbacks: Vec::new(),
            stop_condition: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut tool_defs = Vec::new();
        let mut tools = HashMap::new();

        for tool in self.tools {
            let def = tool.definition()?;
            if tools.contains_key(&def.name) {
                return Err(Error::MissingArg(format!(
                    "tool names must be unique, {} is registered twice",
                    def.name
                )));
            }
            tools.insert(def.name.clone(), tool);
            tool_defs.push(def);
        }

        Ok(Agent {
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            system_prompt: self.system_prompt,
            tools,
            tool_defs,
            callbacks: self.callbacks,
            stop_condition: self.stop_condition.unwrap_or_else(|| Box::new(FinalAnswer)),
            max_iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::agent::ITERATION_LIMIT_OUTPUT;
    use crate::llm::{CompletionRequest, CompletionResponse, Content, LLM, Message};
    use crate::tools::{FunctionalTool, SaveTool, ToolCall, ToolDefinition};
    use crate::{AgentBuilder, Result, StopCondition};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MockLLM;

    #[async_trait]
    impl LLM for MockLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            match request.messages.last() {
                Some(Message::User(_)) => Ok(CompletionResponse {
                    content: Content::from("tool call"),
                    tool_calls: vec![ToolCall {
                        id: "call1".to_string(),
                        name: "double".to_string(),
                        args: "{\"arg\":123}".to_string(),
                    }],
                }),
                Some(Message::Tool { .. }) => Ok(CompletionResponse {
                    content: Content::from("tool call recieved"),
                    tool_calls: vec![],
                }),
                Some(Message::Assistant(_, _)) => Ok(CompletionResponse {
                    content: Content::from("completed"),
                    tool_calls: vec![],
                }),
                _ => panic!("unexpected message sequence"),
            }
        }
    }

    /// Asks for a tool on every turn and never answers.
    struct LoopingLLM {
        tool: &'static str,
    }

    #[async_trait]
    impl LLM for LoopingLLM {
        async fn completion<'a>(&self, _: CompletionRequest<'a>) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                content: Content::from(""),
                tool_calls: vec![ToolCall {
                    id: "loop".to_string(),
                    name: self.tool.to_string(),
                    args: "{\"arg\":1}".to_string(),
                }],
            })
        }
    }

    struct DoubleTool;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct DoubleArgs {
        arg: i32,
    }

    #[async_trait]
    impl FunctionalTool for DoubleTool {
        fn definition(&self) -> Result<ToolDefinition> {
            ToolDefinition::new::<DoubleArgs>("double", "double")
        }

        async fn invoke_fn(&mut self, tool_call: &ToolCall) -> Result<Message> {
            let args: DoubleArgs = tool_call.args()?;
            Ok(tool_call.respond(format!("2 * {} = {}", args.arg, 2 * args.arg)))
        }
    }

    struct SimpleStop;

    impl StopCondition for SimpleStop {
        fn done(&self, history: &[Message]) -> bool {
            if let Some(Message::Assistant(content, _)) = history.last() {
                content.text() == "completed"
            } else {
                false
            }
        }
    }

    #[tokio::test]
    async fn test_agent() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(MockLLM))
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(SimpleStop))
            .build()?;

        let result = agent
            .run(vec![Message::User("do stuff".to_string())])
            .await?;
        let history = result.messages;

        assert_eq!(history.len(), 5);
        assert_eq!(result.output, Content::from("completed"));

        assert!(matches!(&history[0], Message::User (content) if content == "do stuff"));
        assert!(matches!(&history[1], Message::Assistant (_, tool_calls) if tool_calls.len() == 1));
        assert!(matches!(&history[2], Message::Tool {  result,.. } if result == "2 * 123 = 246"));
        assert!(
            matches!(&history[3], Message::Assistant (content, _) if content.text() == "tool call recieved")
        );
        assert!(matches!(&history[4], Message::Assistant (content, _) if content.text() == "completed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_final_answer_stops_on_first_plain_reply() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(MockLLM))
            .system_prompt("answer briefly".to_string())
            .tool(Box::new(DoubleTool))
            .build()?;

        let result = agent.invoke("do stuff").await?;

        assert_eq!(result.messages.len(), 5);
        assert!(matches!(&result.messages[0], Message::System(prompt) if prompt == "answer briefly"));
        assert_eq!(result.output, Content::from("tool call recieved"));
        Ok(())
    }

    #[tokio::test]
    async fn test_iteration_limit() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(LoopingLLM { tool: "double" }))
            .tool(Box::new(DoubleTool))
            .max_iterations(3)
            .build()?;

        let result = agent.invoke("loop forever").await?;

        assert_eq!(result.output, Content::from(ITERATION_LIMIT_OUTPUT));
        assert_eq!(result.messages.len(), 1 + 3 * 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(LoopingLLM { tool: "telepathy" }))
            .tool(Box::new(DoubleTool))
            .max_iterations(1)
            .build()?;

        let result = agent.invoke("read my mind").await?;

        assert!(matches!(
            &result.messages[2],
            Message::Tool { result, .. } if result == "telepathy is not a valid tool, try one of [double]."
        ));
        Ok(())
    }

    /// Calls `save_to_txt` with the wrong argument names, then answers.
    struct MisusingLLM;

    #[async_trait]
    impl LLM for MisusingLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            match request.messages.last() {
                Some(Message::Tool { .. }) => Ok(CompletionResponse {
                    content: Content::from("could not save"),
                    tool_calls: vec![],
                }),
                _ => Ok(CompletionResponse {
                    content: Content::from(""),
                    tool_calls: vec![ToolCall {
                        id: "call1".to_string(),
                        name: "save_to_txt".to_string(),
                        args: "{\"text\":\"water boils\"}".to_string(),
                    }],
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_malformed_tool_arguments_keep_the_run_alive() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(MisusingLLM))
            .tool(SaveTool::new(dir.path()))
            .build()?;

        let result = agent.invoke("save it").await?;

        assert_eq!(result.output, Content::from("could not save"));
        assert!(matches!(
            &result.messages[2],
            Message::Tool { result, .. } if result.starts_with("Invalid arguments for save_to_txt:")
        ));
        Ok(())
    }

    #[test]
    fn test_build_rejects_duplicate_tools_and_missing_llm() {
        assert!(
            AgentBuilder::new()
                .llm(Arc::new(MockLLM))
                .tool(Box::new(DoubleTool))
                .tool(Box::new(DoubleTool))
                .build()
                .is_err()
        );
        assert!(AgentBuilder::new().build().is_err());
    }
}

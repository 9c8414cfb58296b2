use crate::render::{Console, Panel};
use crate::schema::{ResearchResponse, parse_response};
use agent::llm::Content;
use agent::retry::{RetryPolicy, Sleeper};
use agent::{Agent, Error, Result};
use async_trait::async_trait;
use std::io::Write;
use tracing::{info, warn};

/// Anything that can turn a question into raw model output.
#[async_trait]
pub trait Researcher {
    async fn research(&mut self, question: &str) -> Result<Content>;
}

#[async_trait]
impl Researcher for Agent {
    async fn research(&mut self, question: &str) -> Result<Content> {
        Ok(self.invoke(question).await?.output)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Rendered(ResearchResponse),
    RetriesExhausted,
    Unparsable,
}

/// Dispatches one question with quota retries, then parses and renders
/// the answer.
pub struct Driver<R, S, W: Write> {
    researcher: R,
    sleeper: S,
    console: Console<W>,
    policy: RetryPolicy,
}

impl<R: Researcher, S: Sleeper, W: Write> Driver<R, S, W> {
    pub fn new(researcher: R, sleeper: S, console: Console<W>) -> Self {
        Self {
            researcher,
            sleeper,
            console,
            policy: RetryPolicy::model(),
        }
    }

    #[cfg(test)]
    pub fn console(&self) -> &Console<W> {
        &self.console
    }

    /// Errors other than quota exhaustion are returned as-is.
    pub async fn run(&mut self, question: &str) -> Result<Outcome> {
        let Some(raw) = self.dispatch(question).await? else {
            self.console
                .failure("Failed to get response after multiple retries due to rate limits.")?;
            return Ok(Outcome::RetriesExhausted);
        };

        let text = raw.text();
        match parse_response(&text) {
            Ok(response) => {
                self.console.panel(&Panel::from_response(&response))?;
                Ok(Outcome::Rendered(response))
            }
            Err(err) => {
                warn!(error = %err, "model output did not match the response schema");
                self.console
                    .failure_with_detail("Error parsing response:", &err.to_string())?;
                self.console.line(&format!("Raw Response: {}", text))?;
                Ok(Outcome::Unparsable)
            }
        }
    }

    async fn dispatch(&mut self, question: &str) -> Result<Option<Content>> {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            self.console.start_status("Researching...")?;
            let err = match self.researcher.research(question).await {
                Ok(raw) => {
                    info!(attempt, "research finished");
                    return Ok(Some(raw));
                }
                Err(err) => err,
            };

            let delay = self.policy.backoff.delay(attempt);
            let notice = if matches!(err, Error::RateLimited(_)) {
                format!(
                    "Quota exceeded. Waiting for {} seconds before retrying... (Attempt {}/{})",
                    delay.as_secs(),
                    attempt,
                    max
                )
            } else if err.is_rate_limited() {
                format!(
                    "Hit rate limit. Waiting {} seconds... (Attempt {}/{})",
                    delay.as_secs(),
                    attempt,
                    max
                )
            } else {
                self.console.warn(&format!("Error occurred: {}", err))?;
                return Err(err);
            };

            self.console.warn(&notice)?;
            warn!(attempt, error = %err, "model call rate limited");
            self.sleeper.sleep(delay).await;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::{Driver, Outcome, Researcher};
    use crate::render::Console;
    use crate::schema::ResearchResponse;
    use agent::llm::{CompletionRequest, CompletionResponse, Content, ContentPart, LLM};
    use agent::retry::Sleeper;
    use agent::{AgentBuilder, Error, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const ANSWER: &str = r#"{"topic":"Boiling point of water","summary":"100°C at sea level.","sources":["physics-reference"],"tools_used":["search"]}"#;
    const QUESTION: &str = "What is the boiling point of water at sea level?";

    #[derive(Clone, Default)]
    struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

    impl RecordingSleeper {
        fn slept(&self) -> Vec<u64> {
            self.0.lock().unwrap().iter().map(Duration::as_secs).collect()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    /// Replies with a fixed final answer and records what it was asked.
    struct CannedLLM {
        reply: Content,
        asked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LLM for CannedLLM {
        async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse> {
            if let Some(agent::llm::Message::User(question)) = request.messages.last() {
                self.asked.lock().unwrap().push(question.clone());
            }
            Ok(CompletionResponse {
                content: self.reply.clone(),
                tool_calls: vec![],
            })
        }
    }

    /// Pops one scripted error per call until none are left, then answers.
    struct ScriptedResearcher {
        failures: Vec<Error>,
        calls: u32,
    }

    #[async_trait]
    impl Researcher for ScriptedResearcher {
        async fn research(&mut self, _: &str) -> Result<Content> {
            self.calls += 1;
            match self.failures.pop() {
                Some(err) => Err(err),
                None => Ok(Content::from(ANSWER)),
            }
        }
    }

    fn agent_replying(reply: Content) -> agent::Agent {
        AgentBuilder::new()
            .llm(Arc::new(CannedLLM {
                reply,
                asked: Mutex::new(vec![]),
            }))
            .build()
            .unwrap()
    }

    fn output<R: Researcher>(driver: &Driver<R, RecordingSleeper, Vec<u8>>) -> String {
        String::from_utf8(driver.console().writer().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_renders_schema_answer() -> Result<()> {
        let sleeper = RecordingSleeper::default();
        let mut driver = Driver::new(
            agent_replying(Content::from(ANSWER)),
            sleeper.clone(),
            Console::new(Vec::new()),
        );

        let outcome = driver.run(QUESTION).await?;

        assert_eq!(
            outcome,
            Outcome::Rendered(ResearchResponse {
                topic: "Boiling point of water".to_string(),
                summary: "100°C at sea level.".to_string(),
                sources: vec!["physics-reference".to_string()],
                tools_used: vec!["search".to_string()],
            })
        );
        let out = output(&driver);
        assert!(out.contains("Boiling point of water"));
        assert!(out.contains("100°C at sea level."));
        assert!(out.contains("Sources: physics-reference | Tools: search"));
        assert!(sleeper.slept().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_chunked_fenced_output_matches_plain() -> Result<()> {
        let (head, tail) = ANSWER.split_at(20);
        let chunked = Content::Parts(vec![
            ContentPart::Text("```json\n".to_string()),
            ContentPart::Block {
                kind: "text".to_string(),
                text: Some(head.to_string()),
            },
            ContentPart::Text(format!("{}\n```", tail)),
        ]);

        let mut plain = Driver::new(
            agent_replying(Content::from(ANSWER)),
            RecordingSleeper::default(),
            Console::new(Vec::new()),
        );
        let mut chunks = Driver::new(
            agent_replying(chunked),
            RecordingSleeper::default(),
            Console::new(Vec::new()),
        );

        assert_eq!(plain.run(QUESTION).await?, chunks.run(QUESTION).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_prose_reports_parse_error() -> Result<()> {
        let prose = "Water boils at 100 degrees Celsius at sea level.";
        let mut driver = Driver::new(
            agent_replying(Content::from(prose)),
            RecordingSleeper::default(),
            Console::new(Vec::new()),
        );

        assert_eq!(driver.run(QUESTION).await?, Outcome::Unparsable);

        let out = output(&driver);
        assert!(out.contains("Error parsing response:"));
        assert!(out.contains(&format!("Raw Response: {}", prose)));
        assert!(!out.contains("Sources:"));
        Ok(())
    }

    #[tokio::test]
    async fn test_quota_exhaustion_on_every_attempt() -> Result<()> {
        let sleeper = RecordingSleeper::default();
        let mut driver = Driver::new(
            ScriptedResearcher {
                failures: (0..5)
                    .map(|_| Error::RateLimited("RESOURCE_EXHAUSTED".to_string()))
                    .collect(),
                calls: 0,
            },
            sleeper.clone(),
            Console::new(Vec::new()),
        );

        assert_eq!(driver.run(QUESTION).await?, Outcome::RetriesExhausted);

        let out = output(&driver);
        assert_eq!(out.matches("Quota exceeded. Waiting for 60 seconds").count(), 5);
        assert!(out.contains("(Attempt 5/5)"));
        assert!(out.contains("Failed to get response after multiple retries due to rate limits."));
        assert_eq!(sleeper.slept(), vec![60; 5]);
        Ok(())
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() -> Result<()> {
        let sleeper = RecordingSleeper::default();
        let mut driver = Driver::new(
            ScriptedResearcher {
                failures: vec![
                    Error::LLMResponseError("status 429".to_string()),
                    Error::RateLimited("quota".to_string()),
                ],
                calls: 0,
            },
            sleeper.clone(),
            Console::new(Vec::new()),
        );

        assert!(matches!(driver.run(QUESTION).await?, Outcome::Rendered(_)));
        assert_eq!(driver.researcher.calls, 3);
        assert_eq!(sleeper.slept(), vec![60, 60]);

        let out = output(&driver);
        assert!(out.contains("Quota exceeded. Waiting for 60 seconds before retrying... (Attempt 1/5)"));
        assert!(out.contains("Hit rate limit. Waiting 60 seconds... (Attempt 2/5)"));
        assert_eq!(driver.console().status(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_other_errors_propagate_without_retry() {
        let sleeper = RecordingSleeper::default();
        let mut driver = Driver::new(
            ScriptedResearcher {
                failures: vec![Error::LLMResponseError("choices is empty".to_string())],
                calls: 0,
            },
            sleeper.clone(),
            Console::new(Vec::new()),
        );

        let result = driver.run(QUESTION).await;

        assert!(matches!(result, Err(Error::LLMResponseError(_))));
        assert_eq!(driver.researcher.calls, 1);
        assert!(sleeper.slept().is_empty());
        assert!(output(&driver).contains("Error occurred: No response from llm: choices is empty"));
        assert_eq!(driver.console().status(), None);
    }

    #[tokio::test]
    async fn test_question_reaches_the_model() -> Result<()> {
        let llm = Arc::new(CannedLLM {
            reply: Content::from(ANSWER),
            asked: Mutex::new(vec![]),
        });
        let mut agent = AgentBuilder::new().llm(llm.clone()).build()?;

        agent.research(QUESTION).await?;

        assert_eq!(*llm.asked.lock().unwrap(), vec![QUESTION.to_string()]);
        Ok(())
    }
}

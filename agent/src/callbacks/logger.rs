use crate::Result;
use crate::callbacks::Callback;
use crate::llm::Message;
use async_trait::async_trait;
use std::io::Write;

/// Writes a markdown transcript of an agent run. Each step only prints the
/// messages added since the previous step.
pub struct MessageLogger<W: Write + Send> {
    seen: Vec<u64>,
    writer: W,
    step: u32,
}

impl<W: Write + Send> MessageLogger<W> {
    pub fn new(title: &str, mut writer: W) -> Result<Box<Self>> {
        write!(writer, "# {}\n\n", title)?;

        Ok(Box::new(Self {
            seen: Vec::new(),
            writer,
            step: 0,
        }))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_step(&mut self, messages: &[Message]) -> Result<()> {
        write!(self.writer, "## Step {}\n\n", self.step)?;
        for message in messages {
            write!(self.writer, "{}", message)?;
        }
        write!(self.writer, "---\n\n")?;
        Ok(())
    }

    fn is_continuation(&self, hashes: &[u64]) -> bool {
        hashes.len() >= self.seen.len() && hashes.iter().zip(&self.seen).all(|(a, b)| a == b)
    }
}

#[async_trait]
impl<W: Write + Send> Callback for MessageLogger<W> {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let hashes = messages.iter().map(Message::get_hash).collect::<Vec<_>>();

        if self.is_continuation(&hashes) {
            self.write_step(&messages[self.seen.len()..])?;
        } else {
            write!(self.writer, "## [HISTORY REWRITTEN]\n\n")?;
            self.write_step(&messages)?;
        }
        self.writer.flush()?;

        self.step += 1;
        self.seen = hashes;

        Ok(messages)
    }
}

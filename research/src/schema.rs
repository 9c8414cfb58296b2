use agent::Result;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};

/// The answer the model is instructed to produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchResponse {
    pub topic: String,
    /// markdown formatted answer
    pub summary: String,
    pub sources: Vec<String>,
    pub tools_used: Vec<String>,
}

/// Tells the model how to shape its final answer, with the JSON schema of
/// [`ResearchResponse`] embedded.
pub fn format_instructions() -> Result<String> {
    let mut schema = serde_json::to_value(schema_for!(ResearchResponse))?;
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }

    Ok(format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
As an example, for the schema {{\"properties\": {{\"foo\": {{\"title\": \"Foo\", \"description\": \"a list of strings\", \"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\n\
Here is the output schema:\n```\n{}\n```",
        serde_json::to_string(&schema)?
    ))
}

/// Drops a surrounding markdown code fence. A fence tagged `json` wins over
/// a bare one; only the first fenced block is kept.
pub fn strip_code_fence(text: &str) -> &str {
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    match text.split("```").nth(1) {
        Some(fenced) => fenced.trim(),
        None => text.trim(),
    }
}

pub fn parse_response(text: &str) -> Result<ResearchResponse> {
    Ok(serde_json::from_str(strip_code_fence(text))?)
}

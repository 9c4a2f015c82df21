//! Channel protocol codec.
//!
//! Some models take the whole conversation as one delimited text blob with
//! explicit role and channel markers instead of structured JSON roles and a
//! native `tools` field. Tool definitions are rendered into the blob itself,
//! so a request carrying this encoding must not also populate `tools`.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::api::{Message, ReasoningLevel, Role, ToolSchema};

pub const RETURN_TOKEN: &str = "<|return|>";
pub const END_TOKEN: &str = "<|end|>";
/// Open prefix the model is expected to complete.
pub const ASSISTANT_FINAL_PREFIX: &str = "<|start|>assistant<|channel|>final<|message|>";

const TOOL_CALL_INSTRUCTIONS: &str = "## Tool Calling Instructions\n\n\
Call tools in the commentary channel using this format:\n\
`<|start|>assistant<|channel|>commentary to=functions.TOOL_NAME <|constrain|>json<|message|>{\"param\": \"value\"}<|call|>`\n\n\
After tool execution, provide your analysis in the analysis channel if needed, then give the final response in the final channel.<|end|>\n\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no messages provided")]
    Empty,
    #[error("empty content at message {0}")]
    EmptyContent(usize),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCodec {
    reasoning: ReasoningLevel,
}

impl ChannelCodec {
    pub fn new(reasoning: ReasoningLevel) -> Self {
        Self { reasoning }
    }

    pub fn reasoning(&self) -> ReasoningLevel {
        self.reasoning
    }

    /// Render `messages` and `tools` into one prompt.
    ///
    /// Validation failures are logged and encoding continues with the full
    /// message list. Tool-role messages have no representation and are
    /// skipped.
    pub fn encode(&self, messages: &[Message], tools: &[ToolSchema]) -> String {
        if let Err(err) = validate_messages(messages) {
            warn!(error = %err, "channel message validation failed; encoding anyway");
        }

        let mut out = String::new();
        let last = messages.len().saturating_sub(1);

        for (i, message) in messages.iter().enumerate() {
            match message.role {
                Role::System => {
                    out.push_str("<|start|>system<|message|>");
                    out.push_str(&message.content);
                    out.push_str("\n\nReasoning: ");
                    out.push_str(self.reasoning.as_str());
                    out.push_str("<|end|>\n\n");
                }
                Role::User => {
                    out.push_str("<|start|>user<|message|>");
                    out.push_str(&message.content);
                    out.push_str(END_TOKEN);
                    if i < last {
                        out.push_str("\n\n");
                    }
                }
                Role::Assistant => {
                    // A replayed reply may still carry its return sentinel.
                    let history = convert_return_to_end(&message.content);
                    out.push_str(ASSISTANT_FINAL_PREFIX);
                    out.push_str(history.strip_suffix(END_TOKEN).unwrap_or(&history));
                    out.push_str("<|end|>\n\n");
                }
                Role::Developer => {
                    out.push_str("<|start|>developer<|message|>");
                    out.push_str(&message.content);
                    out.push_str("<|end|>\n\n");
                }
                Role::Tool => {}
            }
        }

        if !tools.is_empty() {
            out.push_str("<|start|>developer<|message|># Available Tools\n\n");
            out.push_str("## functions\n\n");
            out.push_str("namespace functions {\n\n");
            for tool in tools {
                out.push_str(&format!(
                    "// {}\ntype {} = ({}) => any;\n\n",
                    tool.description,
                    tool.name,
                    format_tool_parameters(&tool.parameters)
                ));
            }
            out.push_str("} // namespace functions\n\n");
            out.push_str(TOOL_CALL_INSTRUCTIONS);
        }

        out.push_str(ASSISTANT_FINAL_PREFIX);
        out
    }
}

pub fn validate_messages(messages: &[Message]) -> Result<(), ValidationError> {
    if messages.is_empty() {
        return Err(ValidationError::Empty);
    }
    match messages
        .iter()
        .position(|message| message.content.trim().is_empty())
    {
        Some(index) => Err(ValidationError::EmptyContent(index)),
        None => Ok(()),
    }
}

/// Render a JSON-schema object as `{name: type, other?: type}`.
///
/// Properties missing from `required` get a `?`; a property without a
/// string `type` is a `string`. Anything without usable properties is
/// `_: any`.
pub fn format_tool_parameters(parameters: &Value) -> String {
    let Some(properties) = parameters.get("properties").and_then(Value::as_object) else {
        return "_: any".to_string();
    };

    let required: Vec<&str> = parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let parts: Vec<String> = properties
        .iter()
        .filter(|(_, definition)| definition.is_object())
        .map(|(name, definition)| {
            let kind = definition
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string");
            let optional = if required.contains(&name.as_str()) {
                ""
            } else {
                "?"
            };
            format!("{name}{optional}: {kind}")
        })
        .collect();

    if parts.is_empty() {
        "_: any".to_string()
    } else {
        format!("{{{}}}", parts.join(", "))
    }
}

/// Trim the model output and drop one trailing return sentinel.
pub fn strip_return_token(response: &str) -> &str {
    let trimmed = response.trim();
    trimmed.strip_suffix(RETURN_TOKEN).unwrap_or(trimmed)
}

/// Rewrite return sentinels as turn-end delimiters for conversation history.
pub fn convert_return_to_end(conversation: &str) -> String {
    conversation.replace(RETURN_TOKEN, END_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_file_tool() -> ToolSchema {
        ToolSchema::new(
            "read_file",
            "Read a file from the workspace",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }),
        )
    }

    #[test]
    fn encodes_roles_with_delimiters() {
        let codec = ChannelCodec::default();
        let prompt = codec.encode(
            &[
                Message::system("Be brief."),
                Message::user("Hi"),
                Message::assistant("Hello."),
                Message::user("Bye"),
            ],
            &[],
        );
        assert_eq!(
            prompt,
            "<|start|>system<|message|>Be brief.\n\nReasoning: high<|end|>\n\n\
             <|start|>user<|message|>Hi<|end|>\n\n\
             <|start|>assistant<|channel|>final<|message|>Hello.<|end|>\n\n\
             <|start|>user<|message|>Bye<|end|>\
             <|start|>assistant<|channel|>final<|message|>"
        );
    }

    #[test]
    fn reasoning_level_is_configurable() {
        let prompt = ChannelCodec::new(ReasoningLevel::Low).encode(&[Message::system("S")], &[]);
        assert!(prompt.starts_with("<|start|>system<|message|>S\n\nReasoning: low<|end|>"));
    }

    #[test]
    fn developer_messages_are_wrapped_and_tool_messages_skipped() {
        let prompt = ChannelCodec::default().encode(
            &[
                Message::developer("Rules"),
                Message::tool_result("call_1", "file contents"),
            ],
            &[],
        );
        assert_eq!(
            prompt,
            "<|start|>developer<|message|>Rules<|end|>\n\n<|start|>assistant<|channel|>final<|message|>"
        );
    }

    #[test]
    fn tools_render_as_pseudo_signatures() {
        let prompt = ChannelCodec::default().encode(&[Message::user("go")], &[read_file_tool()]);
        assert!(prompt.contains(
            "<|start|>user<|message|>go<|end|><|start|>developer<|message|># Available Tools\n\n## functions\n\nnamespace functions {\n\n"
        ));
        assert!(prompt.contains(
            "// Read a file from the workspace\ntype read_file = ({limit?: integer, path: string}) => any;\n\n} // namespace functions\n\n"
        ));
        assert!(prompt.contains("commentary to=functions.TOOL_NAME <|constrain|>json"));
        assert!(prompt.ends_with(
            "then give the final response in the final channel.<|end|>\n\n<|start|>assistant<|channel|>final<|message|>"
        ));
    }

    #[test]
    fn parameter_rendering_handles_sparse_schemas() {
        assert_eq!(format_tool_parameters(&Value::Null), "_: any");
        assert_eq!(format_tool_parameters(&json!({"type": "object"})), "_: any");
        assert_eq!(
            format_tool_parameters(&json!({"properties": {"q": {}}})),
            "{q?: string}"
        );
        assert_eq!(
            format_tool_parameters(&json!({"properties": {"q": "bogus"}})),
            "_: any"
        );
    }

    #[test]
    fn invalid_messages_are_still_encoded() {
        assert_eq!(validate_messages(&[]), Err(ValidationError::Empty));
        let messages = [Message::user("  "), Message::user("real")];
        assert_eq!(validate_messages(&messages), Err(ValidationError::EmptyContent(0)));

        let prompt = ChannelCodec::default().encode(&messages, &[]);
        assert!(prompt.starts_with("<|start|>user<|message|>  <|end|>\n\n"));
        assert_eq!(
            ChannelCodec::default().encode(&[], &[]),
            ASSISTANT_FINAL_PREFIX
        );
    }

    #[test]
    fn return_sentinel_round_trip() {
        let codec = ChannelCodec::default();
        let prompt = codec.encode(&[Message::user("sum 2+2")], &[read_file_tool()]);
        assert!(prompt.ends_with(ASSISTANT_FINAL_PREFIX));

        let raw = "The answer is <|return|> not a sentinel here. 4<|return|>\n";
        let stripped = strip_return_token(raw);
        assert_eq!(stripped, "The answer is <|return|> not a sentinel here. 4");

        let history = convert_return_to_end("final<|message|>4<|return|>");
        assert_eq!(history, "final<|message|>4<|end|>");
    }

    #[test]
    fn replayed_assistant_turns_close_with_end_token() {
        let codec = ChannelCodec::default();
        let prompt = codec.encode(
            &[
                Message::user("2+2?"),
                Message::assistant("4<|return|>"),
                Message::user("and 3+3?"),
            ],
            &[],
        );
        assert!(prompt.contains("<|start|>assistant<|channel|>final<|message|>4<|end|>\n\n"));
        assert!(!prompt.contains(RETURN_TOKEN));
        assert!(!prompt.contains("<|end|><|end|>"));
    }

    #[test]
    fn strip_only_removes_one_trailing_sentinel() {
        assert_eq!(strip_return_token("done<|return|><|return|>"), "done<|return|>");
        assert_eq!(strip_return_token("  plain text  "), "plain text");
    }
}

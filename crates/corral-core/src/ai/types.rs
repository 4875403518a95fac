//! Provider-facing message and tool types.
//!
//! These are wire-shaped for the Anthropic Messages API so serialisation
//! at the provider boundary is a plain `serde_json::to_value`. Everything
//! above the provider treats them as the domain conversation model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Base64 payload for image and document blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl MediaSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// Content blocks that can appear in a message.
///
/// `ToolUse` appears only in assistant turns; `ToolResult`, `Image` and
/// `Document` only in user turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },

    Image {
        source: MediaSource,
    },

    /// Document content (PDF).
    Document {
        source: MediaSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: Vec<Content>,
}

impl ModelMessage {
    pub fn user(content: Vec<Content>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Content::Text { text: text.into() }])
    }

    pub fn assistant(content: Vec<Content>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![Content::Text { text: text.into() }])
    }

    /// Concatenated text blocks of this message.
    pub fn text(&self) -> String {
        let mut combined = String::new();
        for block in &self.content {
            if let Content::Text { text } = block {
                combined.push_str(text);
            }
        }
        combined
    }

    /// Tool calls requested in this message (assistant turns).
    pub fn tool_calls(&self) -> Vec<AiToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                Content::ToolUse { id, name, input } => Some(AiToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    #[serde(untagged)]
    Other(String),
}

impl StopReason {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// Token usage as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_serializes_with_type_tag() {
        let block = Content::ToolUse {
            id: "tu_1".into(),
            name: "echo".into(),
            input: json!({"x": "A"}),
        };
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["name"], "echo");
    }

    #[test]
    fn tool_result_omits_is_error_when_false() {
        let block = Content::ToolResult {
            tool_use_id: "tu_1".into(),
            content: "ok".into(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert!(value.get("is_error").is_none());

        let roundtrip: Content = serde_json::from_value(value).unwrap();
        assert_eq!(roundtrip, block);
    }

    #[test]
    fn stop_reason_from_wire() {
        assert_eq!(StopReason::from_wire("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_wire("tool_use"), StopReason::ToolUse);
        assert_eq!(
            StopReason::from_wire("pause_turn"),
            StopReason::Other("pause_turn".into())
        );
    }

    #[test]
    fn message_text_concatenates_blocks() {
        let msg = ModelMessage::assistant(vec![
            Content::Text { text: "a".into() },
            Content::ToolUse {
                id: "tu_1".into(),
                name: "echo".into(),
                input: json!({}),
            },
            Content::Text { text: "b".into() },
        ]);
        assert_eq!(msg.text(), "ab");
        assert_eq!(msg.tool_calls().len(), 1);
    }
}

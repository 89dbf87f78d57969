//! Tool results returned by channel plugins and their normalization.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Result of a tool-style action.
///
/// `content` is usually an array of [`ContentBlock`]s but is kept as raw
/// JSON since plugins are free to return anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolResult {
    /// Result carrying only structured details.
    pub fn details(details: Value) -> Self {
        Self {
            content: None,
            details: Some(details),
        }
    }

    /// Result with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        let block = ContentBlock::Text { text: text.into() };
        Self {
            content: serde_json::to_value(vec![block]).ok(),
            details: None,
        }
    }
}

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Pull the most useful payload out of a tool result. Never fails.
///
/// 1. explicit `details`
/// 2. the first non-empty text block: parsed as JSON, else the raw text
/// 3. the raw `content`
/// 4. the whole result
pub fn extract_tool_payload(result: &ToolResult) -> Value {
    if let Some(details) = &result.details {
        return details.clone();
    }
    if let Some(content) = &result.content {
        if let Some(text) = first_text_block(content) {
            return serde_json::from_str(&text).unwrap_or(Value::String(text));
        }
        return content.clone();
    }
    serde_json::to_value(result).unwrap_or_default()
}

fn first_text_block(content: &Value) -> Option<String> {
    let Value::Array(items) = content else {
        return None;
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<ContentBlock>(item.clone()).ok())
        .find_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text),
            ContentBlock::Text { .. } | ContentBlock::Image { .. } => None,
        })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One tool call as it happened. Records are never mutated once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub tool: String,
    pub arguments: Value,
    pub result: Value,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
}

/// Markdown view of the invocation history, oldest first.
pub fn render_history(records: &[ToolInvocationRecord]) -> String {
    if records.is_empty() {
        return "No tool calls recorded yet.".to_string();
    }

    let mut markdown = String::new();
    for record in records {
        let icon = if record.success { "✅" } else { "❌" };
        markdown.push_str(&format!("### {icon} {}\n", record.tool));
        markdown.push_str(&format!(
            "**Time:** {}\n",
            record.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        markdown.push_str(&format!(
            "**Duration:** {:.2}s\n\n",
            record.duration.as_secs_f64()
        ));
        markdown.push_str(&format!(
            "**Arguments:**\n```json\n{}\n```\n\n",
            pretty(&record.arguments)
        ));
        markdown.push_str(&format!(
            "**Result:**\n```json\n{}\n```\n\n",
            pretty(&record.result)
        ));
        markdown.push_str("---\n\n");
    }
    markdown
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

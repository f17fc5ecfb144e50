use serde::{Deserialize, Serialize};

/// Headers the backend prepends to persisted task entries.
const TASK_HEADERS: [&str; 3] = ["Task Successful:", "Task Failed:", "Task Skipped:"];

/// Fields carried by a `task_*` entry or event.
///
/// Payload text is newline separated: `id`, `name`, `result`, then an
/// optional comma separated tool list. Missing trailing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: String,
    pub name: String,
    pub result: String,
    pub tools: Vec<String>,
}

impl TaskPayload {
    pub fn parse(text: &str) -> Self {
        let mut body = text.trim_start();
        for header in TASK_HEADERS {
            if let Some(rest) = body.strip_prefix(header) {
                body = rest.trim_start_matches([' ', '\r', '\n']);
                break;
            }
        }

        let mut fields = body.split('\n').map(clean_field);
        let id = fields.next().unwrap_or_default();
        let name = fields.next().unwrap_or_default();
        let result = fields.next().unwrap_or_default();
        let tools = fields.next().map(|raw| parse_tools(&raw)).unwrap_or_default();

        Self {
            id,
            name,
            result,
            tools,
        }
    }
}

fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('\r').trim();
    trimmed.strip_prefix('-').unwrap_or(trimmed).trim().to_string()
}

fn parse_tools(raw: &str) -> Vec<String> {
    let inner = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(|item| tool_name(item.trim()))
        .filter(|name| !name.is_empty())
        .collect()
}

/// `<function mute_track at 0x10f>` renders as `mute_track`.
fn tool_name(item: &str) -> String {
    let item = item.trim_matches(|c| c == '\'' || c == '"');
    if let Some(rest) = item.strip_prefix("<function ") {
        let name = rest.split_whitespace().next().unwrap_or_default();
        return name.trim_end_matches('>').to_string();
    }
    item.to_string()
}

use parley_shared::models::DEFAULT_TITLE;
use parley_shared::Message;

use crate::provider::AiProvider;

pub const MAX_TITLE_CHARS: usize = 50;
const CONTEXT_MESSAGES: usize = 3;

fn title_prompt(messages: &[Message]) -> String {
    let excerpt = messages
        .iter()
        .take(CONTEXT_MESSAGES)
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Generate a short, descriptive title (max {} characters) for this conversation \
         based on the first few messages. Return only the title, nothing else:\n\n{}",
        MAX_TITLE_CHARS, excerpt
    )
}

/// Trim and cap a model-produced title at `MAX_TITLE_CHARS` characters.
pub fn clamp_title(raw: &str) -> String {
    let title = raw.trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        return format!("{}...", cut);
    }
    title.to_string()
}

/// Ask the provider for a title. Never fails: falls back to the placeholder.
pub async fn generate_title(provider: &dyn AiProvider, messages: &[Message]) -> String {
    match provider.generate(&[Message::user(title_prompt(messages))]).await {
        Ok(generation) => clamp_title(&generation.content),
        Err(e) => {
            tracing::warn!("Title generation failed: {}", e);
            DEFAULT_TITLE.to_string()
        }
    }
}

//! Prompt Rendering
//!
//! Flattens an ordered message log into the single prompt string the
//! generate endpoint expects. The output always ends with the assistant cue
//! so the model continues speaking as the assistant.

use crate::messages::{Message, Role};

/// Trailing cue appended to every rendered prompt
pub const ASSISTANT_CUE: &str = "Assistant: ";

/// Renders message logs into backend prompts
#[derive(Clone, Copy, Debug, Default)]
pub struct PromptSerializer;

impl PromptSerializer {
    /// Render `messages` in order, then the assistant cue
    ///
    /// - `system`: content, then a blank line
    /// - `user`: `"User: "` + content + newline
    /// - `assistant`: `"Assistant: "` + content + newline
    #[must_use]
    pub fn render(messages: &[Message]) -> String {
        let capacity = messages
            .iter()
            .map(|m| m.content().len() + 12)
            .sum::<usize>()
            + ASSISTANT_CUE.len();
        let mut prompt = String::with_capacity(capacity);

        for message in messages {
            match message.role() {
                Role::System => {
                    prompt.push_str(message.content());
                    prompt.push_str("\n\n");
                }
                Role::User => {
                    prompt.push_str("User: ");
                    prompt.push_str(message.content());
                    prompt.push('\n');
                }
                Role::Assistant => {
                    prompt.push_str("Assistant: ");
                    prompt.push_str(message.content());
                    prompt.push('\n');
                }
            }
        }

        prompt.push_str(ASSISTANT_CUE);
        prompt
    }
}

/// Build the user prompt for an analysis request
#[must_use]
pub fn analysis_prompt(analysis_type: &str, text: &str) -> String {
    format!("Please perform {analysis_type} on the following text: '{text}'")
}

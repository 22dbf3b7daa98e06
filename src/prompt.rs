//! Prompt formats per provider family.
//!
//! A [`PromptFormat`] turns `(text, instruction, persona, output format)`
//! into whatever the provider expects and cleans up its raw response. The
//! format is selected per summarizer by [`PromptStyle`] in configuration.
//!
//! | Style | Prompt |
//! |-------|--------|
//! | `chat` | Chat messages with a system persona |
//! | `chat_no_system` | Chat messages, persona as a user/assistant exchange |
//! | `llama2` | Single `[INST]` string with output-format line |
//! | `mixtral` | Single `[INST]` string, wrapping quotes stripped from responses |
//! | `delimited` | Single string with the text between delimiters |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use summary_harness_core::tokens::TokenCounter;

pub const DEFAULT_PERSONA: &str =
    "You always produce factually correct information from any information given and you do not ask questions.";

/// Tokens added per chat message for role markers and separators.
pub const MESSAGE_PADDING: usize = 10;

/// Stand-in content used to measure a prompt's fixed overhead.
const OVERHEAD_PROBE: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// What gets sent to a language model.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Messages(Vec<ChatMessage>),
    Text(String),
}

impl Prompt {
    /// All prompt content as one string, messages separated by newlines.
    pub fn flatten(&self) -> String {
        match self {
            Prompt::Messages(messages) => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Prompt::Text(text) => text.clone(),
        }
    }
}

/// Inputs of one prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptParts<'a> {
    pub text: &'a str,
    pub instruction: &'a str,
    pub persona: &'a str,
    pub output_format: &'a str,
}

impl<'a> PromptParts<'a> {
    fn persona(&self) -> &'a str {
        let persona = self.persona.trim();
        if persona.is_empty() {
            DEFAULT_PERSONA
        } else {
            persona
        }
    }
}

pub trait PromptFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_prompt(&self, parts: &PromptParts<'_>) -> Prompt;

    fn parse_response(&self, raw: &str) -> String {
        raw.trim().to_string()
    }

    /// Estimated tokens of the full prompt, with per-message padding.
    fn token_count(&self, parts: &PromptParts<'_>, counter: &dyn TokenCounter) -> usize {
        match self.build_prompt(parts) {
            Prompt::Messages(messages) => messages
                .iter()
                .map(|m| counter.count(&m.content) + MESSAGE_PADDING)
                .sum(),
            Prompt::Text(text) => counter.count(&text),
        }
    }

    /// Tokens the prompt costs on top of its text content.
    fn prompt_overhead(&self, parts: &PromptParts<'_>, counter: &dyn TokenCounter) -> usize {
        let probed = PromptParts {
            text: OVERHEAD_PROBE,
            ..*parts
        };
        self.token_count(&probed, counter)
            .saturating_sub(counter.count(OVERHEAD_PROBE))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    #[default]
    Chat,
    ChatNoSystem,
    Llama2,
    Mixtral,
    Delimited,
}

pub fn create_format(style: PromptStyle) -> Arc<dyn PromptFormat> {
    match style {
        PromptStyle::Chat => Arc::new(ChatFormat { system_role: true }),
        PromptStyle::ChatNoSystem => Arc::new(ChatFormat { system_role: false }),
        PromptStyle::Llama2 => Arc::new(Llama2Format),
        PromptStyle::Mixtral => Arc::new(MixtralFormat),
        PromptStyle::Delimited => Arc::new(DelimitedFormat),
    }
}

/// OpenAI-style chat messages.
pub struct ChatFormat {
    pub system_role: bool,
}

impl PromptFormat for ChatFormat {
    fn name(&self) -> &'static str {
        if self.system_role {
            "chat"
        } else {
            "chat_no_system"
        }
    }

    fn build_prompt(&self, parts: &PromptParts<'_>) -> Prompt {
        let mut messages = Vec::new();
        let system = format!(
            "Use the following description as a persona for all instructions and questions: {}",
            parts.persona()
        );
        if self.system_role {
            messages.push(ChatMessage::system(system));
        } else {
            messages.push(ChatMessage::user(system));
            messages.push(ChatMessage::assistant(
                "I will use the provided persona when responding to instructions and answering questions.",
            ));
        }

        let text = parts.text.trim();
        if !text.is_empty() {
            messages.push(ChatMessage::user(format!(
                "Reference the following text passage for processing instructions and answering questions: {}",
                text
            )));
            messages.push(ChatMessage::assistant(
                "I will reference the provided information when given instructions and answering questions.",
            ));
        }

        let output_format = parts.output_format.trim();
        if !output_format.is_empty() {
            messages.push(ChatMessage::user(format!(
                "Render all responses according to the following output format instructions: {}",
                output_format
            )));
            messages.push(ChatMessage::assistant(
                "I will render all following responses according to the output format instructions provided.",
            ));
        }

        messages.push(ChatMessage::user(parts.instruction.trim()));
        Prompt::Messages(messages)
    }
}

fn inst_template(parts: &PromptParts<'_>, closing: &str) -> String {
    format!(
        "<s>[INST] <<SYS>>\n{persona}\nYou always produce factually correct information from the text provided.\nYou do not ask questions.\n<</SYS>>\n\nConsider the following text for further questions and instructions:\n{text}\n[/INST]\nI will refer to the provided text when following instructions\n</s>\n<s>[INST]\n{instruction}\n{closing}[/INST]",
        persona = parts.persona(),
        text = parts.text.trim(),
        instruction = parts.instruction.trim(),
        closing = closing,
    )
}

/// Llama-2 `[INST]` template.
pub struct Llama2Format;

impl PromptFormat for Llama2Format {
    fn name(&self) -> &'static str {
        "llama2"
    }

    fn build_prompt(&self, parts: &PromptParts<'_>) -> Prompt {
        let closing = format!(
            "\nDo not include external links.\nEnsure that the generated summary of the provided text is highly accurate.\n{}\n",
            parts.output_format.trim()
        );
        Prompt::Text(inst_template(parts, &closing))
    }
}

/// Mixtral `[INST]` template.
pub struct MixtralFormat;

impl PromptFormat for MixtralFormat {
    fn name(&self) -> &'static str {
        "mixtral"
    }

    fn build_prompt(&self, parts: &PromptParts<'_>) -> Prompt {
        let output_format = parts.output_format.trim();
        let closing = if output_format.is_empty() {
            String::new()
        } else {
            format!("\n{}\n", output_format)
        };
        Prompt::Text(inst_template(parts, &closing))
    }

    fn parse_response(&self, raw: &str) -> String {
        raw.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
    }
}

/// Text fenced by delimiters, instructions after a marker.
pub struct DelimitedFormat;

impl PromptFormat for DelimitedFormat {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn build_prompt(&self, parts: &PromptParts<'_>) -> Prompt {
        let mut instruction = parts.instruction.trim().to_string();
        let output_format = parts.output_format.trim();
        if !output_format.is_empty() {
            instruction.push_str("\n\n");
            instruction.push_str(output_format);
        }
        Prompt::Text(format!(
            "Summarize the following text between the !$!>>> and <<<!$! character sequences using everything after the ###+*$*$*+### character sequence as the instructions for summarization.\n!$!>>>{}<<<!$! ###+*$*$*+### {}",
            parts.text.trim(),
            instruction
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use summary_harness_core::tokens::HeuristicCounter;

    fn parts<'a>(text: &'a str, output_format: &'a str) -> PromptParts<'a> {
        PromptParts {
            text,
            instruction: "Summarize the findings.",
            persona: "",
            output_format,
        }
    }

    fn messages(prompt: Prompt) -> Vec<ChatMessage> {
        match prompt {
            Prompt::Messages(m) => m,
            Prompt::Text(_) => panic!("expected chat messages"),
        }
    }

    #[test]
    fn test_chat_with_system_persona() {
        let m = messages(ChatFormat { system_role: true }.build_prompt(&parts("Body.", "")));
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].role, "system");
        assert!(m[0].content.ends_with(DEFAULT_PERSONA));
        assert!(m[1].content.ends_with("Body."));
        assert_eq!(m[3].content, "Summarize the findings.");
    }

    #[test]
    fn test_chat_without_system_role() {
        let m = messages(ChatFormat { system_role: false }.build_prompt(&parts("", "Bullets.")));
        let roles: Vec<_> = m.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant", "user"]);
        assert!(m[2].content.ends_with("Bullets."));
    }

    #[test]
    fn test_token_count_pads_messages() {
        let format = ChatFormat { system_role: true };
        let p = parts("", "");
        let expected: usize = messages(format.build_prompt(&p))
            .iter()
            .map(|m| HeuristicCounter.count(&m.content) + MESSAGE_PADDING)
            .sum();
        assert_eq!(format.token_count(&p, &HeuristicCounter), expected);
    }

    #[test]
    fn test_overhead_excludes_text() {
        let format = ChatFormat { system_role: true };
        let p = parts("", "");
        let overhead = format.prompt_overhead(&p, &HeuristicCounter);
        let long = "word ".repeat(200);
        let full = format.token_count(&parts(&long, ""), &HeuristicCounter);
        let additive = overhead + HeuristicCounter.count(&long);
        assert!(full.abs_diff(additive) <= 1, "full={} additive={}", full, additive);
    }

    #[test]
    fn test_llama2_includes_format_and_persona() {
        let prompt = Llama2Format.build_prompt(&PromptParts {
            persona: "An economist.",
            ..parts("Body.", "Use bullets.")
        });
        let text = prompt.flatten();
        assert!(text.starts_with("<s>[INST] <<SYS>>\nAn economist."));
        assert!(text.contains("Consider the following text for further questions and instructions:\nBody."));
        assert!(text.contains("Use bullets."));
        assert!(text.ends_with("[/INST]"));
    }

    #[test]
    fn test_mixtral_strips_quotes() {
        assert_eq!(MixtralFormat.parse_response("  \"Quoted answer.\" "), "Quoted answer.");
        assert_eq!(Llama2Format.parse_response(" 'kept' "), "'kept'");
    }

    #[test]
    fn test_delimited_layout() {
        let text = DelimitedFormat.build_prompt(&parts("Body.", "")).flatten();
        assert!(text.contains("!$!>>>Body.<<<!$! ###+*$*$*+### Summarize the findings."));
    }

    #[test]
    fn test_create_format_by_style() {
        assert_eq!(create_format(PromptStyle::ChatNoSystem).name(), "chat_no_system");
        assert_eq!(create_format(PromptStyle::Mixtral).name(), "mixtral");
    }
}

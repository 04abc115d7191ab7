// src/brain/mock.rs
// Deterministic offline engine: same prompts in, same text out. No network, no key.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{extract_json, TextGenerator};
use crate::error::LlmError;
use crate::focus_group::prompts::{MODERATOR_MARKER, QUIET_MARKER, SHIFT_MARKER, SHIFT_SYSTEM_PROMPT};

const RESPONSE_VARIANTS: [&str; 6] = [
    "I can see the upside, but I would still compare options before deciding.",
    "It sounds useful in theory, though I worry it would not hold up in real life.",
    "I like the direction, but the price would be a concern for my household.",
    "I am not fully convinced yet; reliability and value would decide it for me.",
    "I would try it once, but long-term use depends on how consistent it is.",
    "Part of me is curious, and part of me wants more proof before I commit.",
];

const POSITIVE_SHIFT: [&str; 3] = ["now i would buy", "changed my mind", "more positive now"];
const NEGATIVE_SHIFT: [&str; 3] = ["now i would avoid", "less interested now", "more negative now"];

#[derive(Debug, Default, Clone)]
pub struct MockBrain;

impl MockBrain {
    pub fn new() -> Self {
        Self
    }

    fn digest_index(system_prompt: &str, user_prompt: &str) -> usize {
        let mut hasher = Sha256::new();
        hasher.update(system_prompt.as_bytes());
        hasher.update(b"||");
        hasher.update(user_prompt.as_bytes());
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
    }

    fn question(prompt: &str, idx: usize) -> String {
        let phase = ["warmup", "exploration", "deep_dive", "reaction", "synthesis"]
            .into_iter()
            .find(|phase| prompt.contains(&format!("Current phase: {phase}")))
            .unwrap_or("exploration");

        let templates: [&str; 2] = match phase {
            "warmup" => [
                "To get started, what does buying in this category usually look like for you?",
                "Before we dive in, tell us about your recent experience with products like this.",
            ],
            "deep_dive" => [
                "Which feature, pricing detail, or practical issue would make or break this for you?",
                "What would you need to trust this enough to choose it over alternatives?",
            ],
            "reaction" => [
                "After seeing this, what is your immediate reaction and what would you do next?",
                "Based on this material, would you seriously consider trying it? Why or why not?",
            ],
            "synthesis" => [
                "If this were available tomorrow, would you pick it up? What is the main reason?",
                "Final take: who is this for, and would you personally purchase it?",
            ],
            _ => [
                "What is the first thing that comes to mind when you hear this concept?",
                "What expectations or doubts show up for you when you hear this idea?",
            ],
        };
        let mut question = templates[idx % 2].to_string();

        let quiet = prompt
            .split_once(QUIET_MARKER)
            .and_then(|(_, rest)| rest.lines().next())
            .map(str::trim)
            .unwrap_or("");
        if !quiet.is_empty() && quiet != "None" {
            if let Some(first) = quiet.split(',').map(str::trim).find(|n| !n.is_empty()) {
                question.push_str(&format!(" {first}, I especially want your perspective."));
            }
        }
        question
    }

    fn shift(prompt: &str) -> String {
        let lowered = prompt.to_lowercase();
        if POSITIVE_SHIFT.iter().any(|t| lowered.contains(t)) {
            return r#"{"reasoning": "Participant shifted positively", "changed_mind": true, "new_valence": 0.4}"#.to_string();
        }
        if NEGATIVE_SHIFT.iter().any(|t| lowered.contains(t)) {
            return r#"{"reasoning": "Participant shifted negatively", "changed_mind": true, "new_valence": -0.4}"#.to_string();
        }
        r#"{"reasoning": "No shift detected", "changed_mind": false, "new_valence": null}"#.to_string()
    }

    fn response(user_prompt: &str, idx: usize) -> String {
        let base = RESPONSE_VARIANTS[idx % RESPONSE_VARIANTS.len()];
        if user_prompt.contains("Moderator:") {
            match idx % 3 {
                0 => return format!("I agree with what was said earlier. {base}"),
                1 => return format!("I see it differently from some of the group. {base}"),
                _ => {}
            }
        }
        base.to_string()
    }
}

#[async_trait]
impl TextGenerator for MockBrain {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        let idx = Self::digest_index(system_prompt, user_prompt);
        let text = if user_prompt.contains(MODERATOR_MARKER) {
            Self::question(user_prompt, idx)
        } else if user_prompt.contains(SHIFT_MARKER) || system_prompt == SHIFT_SYSTEM_PROMPT {
            Self::shift(user_prompt)
        } else {
            Self::response(user_prompt, idx)
        };
        Ok(text)
    }

    async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let raw = self
            .complete(system_prompt, user_prompt, temperature, max_tokens)
            .await?;
        Ok(extract_json(&raw))
    }
}

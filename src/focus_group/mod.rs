// src/focus_group/mod.rs
// DISCUSSION ENGINE - DATA MODEL
// Phases, messages, run configuration and the transcript handed to analysis.

use serde::{Deserialize, Serialize};

use crate::error::{FocusGroupError, Result};
use crate::persona::Persona;

pub mod moderator;
pub mod participant;
pub mod prompts;
pub mod simulator;

pub use moderator::{Moderator, SelectionState};
pub use participant::{Participant, ShiftAssessment};
pub use simulator::DiscussionSimulator;

pub const MODERATOR_ID: &str = "moderator";
pub const MODERATOR_NAME: &str = "Moderator";

pub const MIN_PERSONAS: usize = 4;
pub const MAX_PERSONAS: usize = 48;
pub const MIN_RESPONSES_PER_QUESTION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Exploration,
    DeepDive,
    Reaction,
    Synthesis,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Warmup,
        Phase::Exploration,
        Phase::DeepDive,
        Phase::Reaction,
        Phase::Synthesis,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Exploration => "exploration",
            Phase::DeepDive => "deep_dive",
            Phase::Reaction => "reaction",
            Phase::Synthesis => "synthesis",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Phase::Warmup => "Warmup",
            Phase::Exploration => "Exploration",
            Phase::DeepDive => "Deep Dive",
            Phase::Reaction => "Reaction",
            Phase::Synthesis => "Synthesis",
        }
    }

    /// Opinion shifts are only tracked once the group is past the opening phases.
    pub fn tracks_opinion_shift(&self) -> bool {
        !matches!(self, Phase::Warmup | Phase::Exploration)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Moderator,
    Participant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionMessage {
    pub role: MessageRole,
    pub speaker_id: String,
    pub speaker_name: String,
    pub content: String,
    pub phase: Phase,
    pub turn_number: usize,
    pub replied_to: Option<String>,
    pub sentiment: Option<f64>,
    pub changed_mind: bool,
}

impl DiscussionMessage {
    pub fn moderator(content: impl Into<String>, phase: Phase, turn_number: usize) -> Self {
        Self {
            role: MessageRole::Moderator,
            speaker_id: MODERATOR_ID.to_string(),
            speaker_name: MODERATOR_NAME.to_string(),
            content: content.into(),
            phase,
            turn_number,
            replied_to: None,
            sentiment: None,
            changed_mind: false,
        }
    }

    pub fn replying_to(mut self, speaker_id: impl Into<String>) -> Self {
        self.replied_to = Some(speaker_id.into());
        self
    }

    pub fn is_participant(&self) -> bool {
        self.role == MessageRole::Participant
    }
}

// --- CONFIGURATION ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionConfig {
    pub product_concept: String,
    pub category: String,
    pub stimulus_material: Option<String>,
    pub num_personas: usize,
    pub phases: Vec<Phase>,
    pub questions_per_phase: usize,
    pub max_responses_per_question: usize,
    pub temperature: f32,
    pub model: Option<String>,
    pub seed: u64,
    /// Replace question/response counts with pool-size defaults before running.
    pub auto_scale: bool,
}

impl DiscussionConfig {
    pub fn builder(product_concept: impl Into<String>, category: impl Into<String>) -> DiscussionConfigBuilder {
        DiscussionConfigBuilder::new(product_concept, category)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(FocusGroupError::Config(msg));
        if !(MIN_PERSONAS..=MAX_PERSONAS).contains(&self.num_personas) {
            return fail(format!(
                "num_personas must be between {MIN_PERSONAS} and {MAX_PERSONAS}, got {}",
                self.num_personas
            ));
        }
        if self.product_concept.trim().is_empty() {
            return fail("product_concept must not be empty".into());
        }
        if self.category.trim().is_empty() {
            return fail("category must not be empty".into());
        }
        if self.phases.is_empty() {
            return fail("at least one phase is required".into());
        }
        if self.questions_per_phase == 0 {
            return fail("questions_per_phase must be at least 1".into());
        }
        if self.max_responses_per_question < MIN_RESPONSES_PER_QUESTION {
            return fail(format!(
                "max_responses_per_question must be at least {MIN_RESPONSES_PER_QUESTION}, got {}",
                self.max_responses_per_question
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return fail(format!("temperature must be within [0, 2], got {}", self.temperature));
        }
        Ok(())
    }

    /// Copy with response and question counts sized for `num_personas`.
    pub fn auto_scaled(&self) -> Self {
        let (max_responses, questions) = match self.num_personas {
            0..=8 => (5, 2),
            9..=12 => (7, 2),
            13..=24 => (8, 3),
            _ => (10, 3),
        };
        Self {
            max_responses_per_question: max_responses,
            questions_per_phase: questions,
            ..self.clone()
        }
    }
}

/// Validating builder; `build` is the only way the API constructs a config.
#[derive(Debug, Clone)]
pub struct DiscussionConfigBuilder {
    config: DiscussionConfig,
}

impl DiscussionConfigBuilder {
    pub fn new(product_concept: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            config: DiscussionConfig {
                product_concept: product_concept.into(),
                category: category.into(),
                stimulus_material: None,
                num_personas: 8,
                phases: Phase::ALL.to_vec(),
                questions_per_phase: 2,
                max_responses_per_question: 5,
                temperature: 0.9,
                model: None,
                seed: 42,
                auto_scale: false,
            },
        }
    }

    pub fn stimulus(mut self, stimulus: impl Into<String>) -> Self {
        self.config.stimulus_material = Some(stimulus.into());
        self
    }

    pub fn num_personas(mut self, n: usize) -> Self {
        self.config.num_personas = n;
        self
    }

    pub fn phases(mut self, phases: Vec<Phase>) -> Self {
        self.config.phases = phases;
        self
    }

    pub fn questions_per_phase(mut self, n: usize) -> Self {
        self.config.questions_per_phase = n;
        self
    }

    pub fn max_responses_per_question(mut self, n: usize) -> Self {
        self.config.max_responses_per_question = n;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn auto_scale(mut self, enabled: bool) -> Self {
        self.config.auto_scale = enabled;
        self
    }

    pub fn build(self) -> Result<DiscussionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionTranscript {
    pub config: DiscussionConfig,
    pub messages: Vec<DiscussionMessage>,
    pub personas: Vec<Persona>,
}

impl DiscussionTranscript {
    pub fn new(config: DiscussionConfig, personas: Vec<Persona>) -> Self {
        Self {
            config,
            messages: Vec::new(),
            personas,
        }
    }

    /// Turn number for the next appended message.
    pub fn next_turn(&self) -> usize {
        self.messages.len() + 1
    }

    pub fn participant_messages(&self) -> impl Iterator<Item = &DiscussionMessage> {
        self.messages.iter().filter(|m| m.is_participant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_count_is_bounded() {
        for (n, ok) in [(2, false), (3, false), (4, true), (8, true), (48, true), (50, false)] {
            let result = DiscussionConfig::builder("AI meal planner", "app").num_personas(n).build();
            assert_eq!(result.is_ok(), ok, "n={n}");
        }
    }

    #[test]
    fn other_fields_are_validated() {
        let base = || DiscussionConfig::builder("AI meal planner", "app");
        assert!(base().questions_per_phase(0).build().is_err());
        assert!(base().max_responses_per_question(2).build().is_err());
        assert!(base().phases(vec![]).build().is_err());
        assert!(base().temperature(2.5).build().is_err());
        assert!(DiscussionConfig::builder(" ", "app").build().is_err());
    }

    #[test]
    fn defaults_cover_every_phase() {
        let config = DiscussionConfig::builder("x", "app").build().unwrap();
        assert_eq!(config.phases, Phase::ALL.to_vec());
        assert_eq!((config.questions_per_phase, config.max_responses_per_question), (2, 5));
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn auto_scale_tiers() {
        let scaled = |n| {
            let c = DiscussionConfig::builder("x", "app").num_personas(n).build().unwrap().auto_scaled();
            (c.max_responses_per_question, c.questions_per_phase)
        };
        assert_eq!(scaled(8), (5, 2));
        assert_eq!(scaled(12), (7, 2));
        assert_eq!(scaled(20), (8, 3));
        assert_eq!(scaled(40), (10, 3));
    }

    #[test]
    fn phases_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::DeepDive).unwrap(), "\"deep_dive\"");
        assert!(!Phase::Exploration.tracks_opinion_shift());
        assert!(Phase::Reaction.tracks_opinion_shift());
    }
}
